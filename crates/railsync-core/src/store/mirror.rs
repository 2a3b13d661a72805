// ── Mirrored panel state ──
//
// The single snapshot the UI observes. Only the reconciliation engine
// mutates it (through the `pub(crate)` setters); every reader gets cheap
// `watch`-backed snapshots and never blocks a writer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::log_buffer::BoundedLog;
use crate::model::{
    AccessoryId, AccessoryStatus, ConnectionRecord, FocusedThrottle, LogEntry, PowerStatus, Role,
    StatusLine, StatusMessage, SystemDescriptor,
};
use crate::stream::ConnectionStream;

/// In-memory mirror of controller state.
pub struct MirrorStore {
    pub(crate) connections: EntityCollection<ConnectionRecord>,
    pub(crate) accessories: EntityCollection<AccessoryStatus>,
    focused: watch::Sender<Option<FocusedThrottle>>,
    systems: watch::Sender<Arc<Vec<SystemDescriptor>>>,
    ports: watch::Sender<Arc<Vec<String>>>,
    status: watch::Sender<Option<StatusMessage>>,
    throttle_status: watch::Sender<Option<StatusLine>>,
    accessory_status: watch::Sender<Option<StatusLine>>,
    transport_log: watch::Sender<BoundedLog<LogEntry>>,
    channel_log: watch::Sender<BoundedLog<LogEntry>>,
    last_poll: watch::Sender<Option<DateTime<Utc>>>,
}

impl MirrorStore {
    pub fn new(transport_log_capacity: usize, channel_log_capacity: usize) -> Self {
        Self {
            connections: EntityCollection::new(),
            accessories: EntityCollection::new(),
            focused: watch::channel(None).0,
            systems: watch::channel(Arc::new(Vec::new())).0,
            ports: watch::channel(Arc::new(Vec::new())).0,
            status: watch::channel(None).0,
            throttle_status: watch::channel(None).0,
            accessory_status: watch::channel(None).0,
            transport_log: watch::channel(BoundedLog::new(transport_log_capacity)).0,
            channel_log: watch::channel(BoundedLog::new(channel_log_capacity)).0,
            last_poll: watch::channel(None).0,
        }
    }

    // ── Connections ──────────────────────────────────────────────────

    pub fn connections_snapshot(&self) -> Arc<Vec<Arc<ConnectionRecord>>> {
        self.connections.snapshot()
    }

    pub fn connection(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        self.connections.get_by_key(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn subscribe_connections(&self) -> ConnectionStream {
        ConnectionStream::new(self.connections.subscribe())
    }

    /// The connection currently assigned the `throttles` role.
    pub fn throttle_controller(&self) -> Option<Arc<ConnectionRecord>> {
        self.controller_for(Role::Throttles)
    }

    /// The connection currently assigned the `accessories` role.
    pub fn accessory_controller(&self) -> Option<Arc<ConnectionRecord>> {
        self.controller_for(Role::Accessories)
    }

    fn controller_for(&self, role: Role) -> Option<Arc<ConnectionRecord>> {
        self.connections
            .snapshot()
            .iter()
            .find(|c| c.has_role(role))
            .cloned()
    }

    /// When the registry was last replaced by a successful poll.
    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        *self.last_poll.borrow()
    }

    pub(crate) fn replace_connections(&self, records: Vec<ConnectionRecord>) {
        self.connections
            .replace_all(records.into_iter().map(|r| (r.id.clone(), r)));
        self.last_poll.send_replace(Some(Utc::now()));
    }

    /// Returns `false` when the connection is not in the registry.
    pub(crate) fn set_connection_power(&self, id: &str, power: PowerStatus) -> bool {
        self.connections
            .modify(id, |record| record.power_status = Some(power))
    }

    // ── Accessories ──────────────────────────────────────────────────

    pub fn accessories_snapshot(&self) -> Arc<Vec<Arc<AccessoryStatus>>> {
        self.accessories.snapshot()
    }

    pub fn accessory(&self, id: &AccessoryId) -> Option<Arc<AccessoryStatus>> {
        self.accessories.get_by_key(&id.key())
    }

    pub(crate) fn upsert_accessory(&self, status: AccessoryStatus) {
        self.accessories.upsert(status.id.key(), status);
    }

    // ── Focused throttle ─────────────────────────────────────────────

    pub fn focused_throttle(&self) -> Option<FocusedThrottle> {
        self.focused.borrow().clone()
    }

    pub fn subscribe_focused_throttle(&self) -> watch::Receiver<Option<FocusedThrottle>> {
        self.focused.subscribe()
    }

    pub(crate) fn set_focused(&self, focused: Option<FocusedThrottle>) {
        self.focused.send_replace(focused);
    }

    /// Mutate the focused throttle if there is one. Subscribers are only
    /// notified when `f` ran.
    pub(crate) fn modify_focused(&self, f: impl FnOnce(&mut FocusedThrottle)) -> bool {
        self.focused.send_if_modified(|focused| match focused {
            Some(throttle) => {
                f(throttle);
                true
            }
            None => false,
        })
    }

    // ── Systems & ports ──────────────────────────────────────────────

    pub fn systems(&self) -> Arc<Vec<SystemDescriptor>> {
        self.systems.borrow().clone()
    }

    pub fn ports(&self) -> Arc<Vec<String>> {
        self.ports.borrow().clone()
    }

    pub fn subscribe_ports(&self) -> watch::Receiver<Arc<Vec<String>>> {
        self.ports.subscribe()
    }

    pub(crate) fn set_systems(&self, systems: Vec<SystemDescriptor>) {
        self.systems.send_replace(Arc::new(systems));
    }

    pub(crate) fn set_ports(&self, ports: Vec<String>) {
        self.ports.send_replace(Arc::new(ports));
    }

    // ── Status lines ─────────────────────────────────────────────────

    pub fn status(&self) -> Option<StatusMessage> {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Option<StatusMessage>> {
        self.status.subscribe()
    }

    pub fn throttle_status(&self) -> Option<StatusLine> {
        self.throttle_status.borrow().clone()
    }

    pub fn accessory_status(&self) -> Option<StatusLine> {
        self.accessory_status.borrow().clone()
    }

    pub(crate) fn set_status(&self, status: StatusMessage) {
        self.status.send_replace(Some(status));
    }

    pub(crate) fn set_throttle_status(&self, text: impl Into<String>) {
        self.throttle_status.send_replace(Some(StatusLine::now(text)));
    }

    pub(crate) fn set_accessory_status(&self, text: impl Into<String>) {
        self.accessory_status.send_replace(Some(StatusLine::now(text)));
    }

    // ── Logs ─────────────────────────────────────────────────────────

    /// Transport log, oldest first.
    pub fn transport_log(&self) -> Vec<LogEntry> {
        self.transport_log.borrow().iter().cloned().collect()
    }

    /// Raw command channel log, oldest first.
    pub fn channel_log(&self) -> Vec<LogEntry> {
        self.channel_log.borrow().iter().cloned().collect()
    }

    pub fn subscribe_transport_log(&self) -> watch::Receiver<BoundedLog<LogEntry>> {
        self.transport_log.subscribe()
    }

    pub fn subscribe_channel_log(&self) -> watch::Receiver<BoundedLog<LogEntry>> {
        self.channel_log.subscribe()
    }

    pub(crate) fn log_transport(&self, entry: LogEntry) {
        self.transport_log.send_modify(|log| log.append(entry));
    }

    pub(crate) fn log_channel(&self, entry: LogEntry) {
        self.channel_log.send_modify(|log| log.append(entry));
    }

    pub(crate) fn clear_transport_log(&self) {
        self.transport_log.send_modify(BoundedLog::clear);
    }

    pub(crate) fn clear_channel_log(&self) {
        self.channel_log.send_modify(BoundedLog::clear);
    }
}

impl Default for MirrorStore {
    fn default() -> Self {
        Self::new(500, 300)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::LogCategory;

    fn record(id: &str, roles: &[Role]) -> ConnectionRecord {
        ConnectionRecord {
            id: id.into(),
            system_type: "xnet-elite".into(),
            connected: true,
            command_station: None,
            power_status: None,
            roles: roles.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn role_lookups_follow_the_registry() {
        let store = MirrorStore::default();
        store.replace_connections(vec![
            record("cs1", &[Role::Throttles]),
            record("cs2", &[Role::Accessories]),
        ]);

        assert_eq!(store.throttle_controller().unwrap().id, "cs1");
        assert_eq!(store.accessory_controller().unwrap().id, "cs2");
        assert!(store.last_poll().is_some());

        store.replace_connections(vec![record("cs2", &[])]);
        assert!(store.throttle_controller().is_none());
        assert_eq!(store.connection_count(), 1);
    }

    #[test]
    fn power_patch_needs_a_known_connection() {
        let store = MirrorStore::default();
        store.replace_connections(vec![record("cs1", &[])]);

        assert!(store.set_connection_power("cs1", PowerStatus::Off));
        assert!(!store.set_connection_power("ghost", PowerStatus::On));
        assert_eq!(
            store.connection("cs1").unwrap().power_status,
            Some(PowerStatus::Off)
        );
    }

    #[test]
    fn logs_are_bounded_per_view() {
        let store = MirrorStore::new(2, 1);
        for i in 0..3 {
            store.log_transport(LogEntry::new(LogCategory::In, format!("t{i}")));
            store.log_channel(LogEntry::new(LogCategory::Out, format!("c{i}")));
        }
        let transport: Vec<String> = store.transport_log().into_iter().map(|e| e.text).collect();
        assert_eq!(transport, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(store.channel_log().len(), 1);

        store.clear_transport_log();
        assert!(store.transport_log().is_empty());
        assert_eq!(store.channel_log().len(), 1);
    }

    #[test]
    fn modify_focused_without_focus_is_a_no_op() {
        let store = MirrorStore::default();
        let mut rx = store.subscribe_focused_throttle();
        assert!(!store.modify_focused(|f| f.state.forward = false));
        assert!(!rx.has_changed().unwrap());
    }
}
