// ── Reconciliation engine ──
//
// Applies every inbound message (poll results, event stream frames,
// command channel frames, local command confirmations) to the
// `MirrorStore`. Methods never perform I/O: follow-up work is returned as
// `Effect`s for the session to run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use railsync_api::command_channel::ChannelEvent;
use railsync_api::event_stream::StreamItem;
use railsync_api::models::{
    AccessoryEntry, ChannelErrorPayload, ChannelMessage, CommunicationErrorPayload,
    ConnectionStatePayload, ControllerEvent, EventKind, PowerPayload, ThrottlePayload,
    ThrottleUpdatePayload, TrafficPayload,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::heuristics::looks_like_version_report;
use crate::model::{
    AccessoryId, AccessoryStatus, ConnectionRecord, FocusedThrottle, LogCategory, LogEntry,
    PowerStatus, StatusMessage, SystemDescriptor, ThrottleKey, ThrottlePatch, turnout_label,
};
use crate::store::MirrorStore;

/// Follow-up work requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Re-poll the connection registry after `after`.
    RefreshConnections { after: Duration },
}

impl Effect {
    pub(crate) fn refresh_now() -> Self {
        Self::RefreshConnections {
            after: Duration::ZERO,
        }
    }
}

/// The single writer of the mirrored state.
pub struct Reconciler {
    store: Arc<MirrorStore>,
    /// Last power status seen per connection, from events or polls.
    power_cache: HashMap<String, PowerStatus>,
    version_refresh_delay: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<MirrorStore>, version_refresh_delay: Duration) -> Self {
        Self {
            store,
            power_cache: HashMap::new(),
            version_refresh_delay,
        }
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.store
    }

    /// Cached power status for a connection.
    pub fn cached_power(&self, connection_id: &str) -> Option<PowerStatus> {
        self.power_cache.get(connection_id).copied()
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Replace the registry wholesale. A record without `powerStatus`
    /// takes the cached value; a present value refreshes the cache.
    pub fn apply_connections(&mut self, mut records: Vec<ConnectionRecord>) {
        for record in &mut records {
            match record.power_status {
                Some(power) => {
                    self.power_cache.insert(record.id.clone(), power);
                }
                None => record.power_status = self.power_cache.get(&record.id).copied(),
            }
        }
        debug!(count = records.len(), "registry replaced");
        self.store.replace_connections(records);
    }

    /// A failed poll leaves the registry untouched.
    pub fn apply_poll_failure(&mut self, err: &CoreError) {
        warn!(error = %err, "connection poll failed");
        self.store
            .set_status(StatusMessage::error(format!("Error loading connections: {err}")));
    }

    pub fn apply_systems(&mut self, systems: Vec<SystemDescriptor>) {
        self.store.set_systems(systems);
    }

    pub fn apply_systems_failure(&mut self, err: &CoreError) {
        warn!(error = %err, "loading systems failed");
        self.store
            .set_status(StatusMessage::error(format!("Error loading systems: {err}")));
    }

    pub fn apply_ports(&mut self, ports: Vec<String>) {
        self.store.set_ports(ports);
    }

    pub fn apply_ports_failure(&mut self, err: &CoreError) {
        warn!(error = %err, "loading ports failed");
        self.store
            .set_status(StatusMessage::error(format!("Error loading ports: {err}")));
    }

    // ── Event stream ─────────────────────────────────────────────────

    pub fn apply_stream_item(&mut self, item: StreamItem) -> Vec<Effect> {
        match item {
            StreamItem::State(state) => {
                debug!(%state, "event stream state");
                Vec::new()
            }
            StreamItem::Event(event) => self.apply_event(&event),
            StreamItem::Malformed { raw, error } => {
                warn!(%error, raw = %raw, "malformed event dropped");
                Vec::new()
            }
        }
    }

    pub fn apply_event(&mut self, event: &ControllerEvent) -> Vec<Effect> {
        let conn = event.connection_id.as_str();
        match event.kind {
            EventKind::MessageReceived | EventKind::MessageSent => {
                let Some(payload) = decode::<TrafficPayload>(event) else {
                    return Vec::new();
                };
                let category = if event.kind == EventKind::MessageReceived {
                    LogCategory::In
                } else {
                    LogCategory::Out
                };
                self.store
                    .log_transport(LogEntry::new(category, traffic_line(conn, &payload)));

                let decoded = first_non_empty(&[payload.decoded.as_deref(), payload.message.as_deref()]);
                let hex = payload.hex.as_deref().unwrap_or_default();
                if event.kind == EventKind::MessageReceived && looks_like_version_report(decoded, hex) {
                    debug!(connection = conn, "version reply seen, scheduling refresh");
                    return vec![Effect::RefreshConnections {
                        after: self.version_refresh_delay,
                    }];
                }
                Vec::new()
            }
            EventKind::ThrottleUpdated => {
                if let Some(payload) = decode::<ThrottleUpdatePayload>(event) {
                    self.apply_throttle_update(conn, &payload);
                }
                Vec::new()
            }
            EventKind::PowerChanged => {
                let payload = decode::<PowerPayload>(event).unwrap_or_default();
                let label = payload.status.unwrap_or_else(|| "UNKNOWN".into());
                let power = PowerStatus::from_label(&label);
                self.power_cache.insert(conn.to_owned(), power);
                self.store.set_connection_power(conn, power);
                self.store
                    .log_transport(LogEntry::new(LogCategory::Power, format!("[{conn}] Power: {label}")));
                Vec::new()
            }
            EventKind::CommunicationError => {
                let payload = decode::<CommunicationErrorPayload>(event).unwrap_or_default();
                let message = payload
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Communication error".into());
                self.store
                    .log_transport(LogEntry::new(LogCategory::Error, format!("[{conn}] Error: {message}")));
                Vec::new()
            }
            EventKind::ConnectionStateChanged => {
                // `connected` is left for the next poll to settle.
                let payload = decode::<ConnectionStatePayload>(event).unwrap_or_default();
                let state = if payload.connected {
                    "Connected"
                } else {
                    "Disconnected"
                };
                self.store
                    .log_transport(LogEntry::new(LogCategory::Power, format!("[{conn}] Connection: {state}")));
                Vec::new()
            }
            EventKind::StreamOpened => {
                debug!("event stream greeting");
                Vec::new()
            }
            EventKind::Unknown => {
                debug!(connection = conn, "ignoring unknown event type");
                Vec::new()
            }
        }
    }

    fn apply_throttle_update(&mut self, conn: &str, payload: &ThrottleUpdatePayload) {
        let property = payload.property.as_deref().unwrap_or_default();
        let description = payload
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("{property} = {}", display_value(&payload.new_value)));
        self.store
            .log_transport(LogEntry::new(LogCategory::Power, format!("[{conn}] {description}")));

        let matches = self.store.focused_throttle().is_some_and(|focused| {
            focused.connection_id.as_deref() == Some(conn)
                && focused.key.address == payload.address
                && payload
                    .long_address
                    .is_none_or(|long| long == focused.key.long_address)
        });
        if !matches {
            debug!(connection = conn, address = payload.address, "throttle update for another throttle");
            return;
        }

        self.store.set_throttle_status(description);
        if let Some(patch) = property_patch(property, &payload.new_value) {
            self.store.modify_focused(|focused| focused.state.apply(&patch));
        }
    }

    // ── Command channel ──────────────────────────────────────────────

    pub fn apply_channel_event(&mut self, event: ChannelEvent) -> Vec<Effect> {
        match event {
            ChannelEvent::State(state) => {
                debug!(%state, "command channel state");
                self.store
                    .log_channel(LogEntry::new(LogCategory::Info, format!("Channel {state}")));
                Vec::new()
            }
            ChannelEvent::Sent(raw) => {
                self.store.log_channel(LogEntry::new(LogCategory::Out, raw));
                Vec::new()
            }
            ChannelEvent::Received { raw, message } => {
                self.store.log_channel(LogEntry::new(LogCategory::In, raw));
                match message {
                    Some(message) => self.apply_channel_message(&message),
                    None => {
                        warn!("malformed command channel frame ignored");
                        Vec::new()
                    }
                }
            }
        }
    }

    pub fn apply_channel_message(&mut self, message: &ChannelMessage) -> Vec<Effect> {
        match message.kind.as_str() {
            "status" => vec![Effect::refresh_now()],
            "throttle" => {
                match message.decode::<ThrottlePayload>() {
                    Ok(payload) => self.apply_throttle_payload(&payload),
                    Err(e) => warn!(error = %e, "throttle frame ignored"),
                }
                Vec::new()
            }
            "accessories" => {
                self.apply_accessories(message);
                Vec::new()
            }
            "error" => {
                let payload = message.decode::<ChannelErrorPayload>().unwrap_or_default();
                let text = payload.message.unwrap_or_else(|| "Unknown error".into());
                let text = match payload.code {
                    Some(code) => format!("Error ({code}): {text}"),
                    None => format!("Error: {text}"),
                };
                self.store.set_status(StatusMessage::error(text));
                Vec::new()
            }
            other => {
                debug!(kind = other, "ignoring command channel frame");
                Vec::new()
            }
        }
    }

    fn apply_throttle_payload(&mut self, payload: &ThrottlePayload) {
        let key = ThrottleKey::new(payload.address, payload.long_address);
        let patch = ThrottlePatch {
            speed: payload.speed,
            forward: payload.forward,
            functions: payload
                .functions
                .iter()
                .flatten()
                .filter_map(|(n, on)| n.parse::<u32>().ok().map(|n| (n, *on)))
                .collect(),
        };

        if self.store.focused_throttle().is_none_or(|f| f.key != key) {
            debug!(address = payload.address, "throttle frame for an unfocused throttle");
            return;
        }
        self.store.modify_focused(|focused| {
            if focused.throttle_id.is_none() {
                if let Some(id) = &payload.throttle {
                    focused.set_throttle_id(id.clone());
                }
            }
            focused.state.apply(&patch);
        });
    }

    fn apply_accessories(&mut self, message: &ChannelMessage) {
        let entries: Vec<AccessoryEntry> = if message.is_patch() {
            match message.decode() {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "accessories patch ignored");
                    return;
                }
            }
        } else {
            let reply = message.decode::<AccessoriesReply>().unwrap_or_default();
            for cmd in &reply.commands {
                self.store.upsert_accessory(AccessoryStatus::new(
                    AccessoryId::Address(cmd.address),
                    turnout_label(cmd.closed),
                ));
            }
            reply.accessories
        };

        for entry in &entries {
            self.store
                .upsert_accessory(AccessoryStatus::new(AccessoryId::Name(entry.name.clone()), &entry.state));
        }
        // Only the first entry reaches the single-line status.
        if let Some(first) = entries.first() {
            self.store
                .set_accessory_status(format!("{}: {}", first.name, first.state));
        }
    }

    // ── Local operations ─────────────────────────────────────────────

    /// Switch focus, resetting throttle state before any update lands.
    pub fn focus_throttle(&mut self, key: ThrottleKey, throttle_id: Option<String>) {
        self.store
            .set_focused(Some(FocusedThrottle::new(key, throttle_id)));
        self.store
            .set_throttle_status(format!("Throttle opened for train {}", key.address));
    }

    pub fn release_throttle(&mut self) {
        self.store.set_focused(None);
        self.store.set_throttle_status("Throttle closed");
    }

    /// Record a confirmed local throttle command against the throttle it
    /// was sent to. Returns `false` when that throttle is no longer focused.
    pub fn apply_local_throttle(
        &mut self,
        key: ThrottleKey,
        throttle_id: &str,
        patch: &ThrottlePatch,
    ) -> bool {
        let still_focused = self.store.focused_throttle().is_some_and(|focused| {
            focused.key == key && focused.throttle_id.as_deref() == Some(throttle_id)
        });
        still_focused
            && self
                .store
                .modify_focused(|focused| focused.state.apply(patch))
    }

    /// Record a confirmed local turnout command.
    pub fn apply_local_accessory(&mut self, address: u32, closed: bool) {
        let label = turnout_label(closed);
        self.store
            .upsert_accessory(AccessoryStatus::new(AccessoryId::Address(address), label));
        self.store.set_accessory_status(format!(
            "Accessory {address} set to {}",
            label.to_uppercase()
        ));
    }

    pub fn set_status(&mut self, status: StatusMessage) {
        self.store.set_status(status);
    }

    pub fn set_throttle_status(&mut self, text: impl Into<String>) {
        self.store.set_throttle_status(text);
    }

    pub fn clear_logs(&mut self) {
        self.store.clear_transport_log();
        self.store.clear_channel_log();
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Non-`patch` accessories reply: `{accessories: [...], commands: [...]}`.
#[derive(Debug, Default, Deserialize)]
struct AccessoriesReply {
    #[serde(default)]
    accessories: Vec<AccessoryEntry>,
    #[serde(default)]
    commands: Vec<AccessoryCommandResult>,
}

#[derive(Debug, Deserialize)]
struct AccessoryCommandResult {
    address: u32,
    closed: bool,
}

fn decode<T: serde::de::DeserializeOwned>(event: &ControllerEvent) -> Option<T> {
    match event.decode() {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(kind = %event.kind, error = %e, "event payload ignored");
            None
        }
    }
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> &'a str {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// `[conn] DIRECTION: decoded (hex)`, falling back to the raw message or
/// hex when nothing was decoded.
fn traffic_line(conn: &str, payload: &TrafficPayload) -> String {
    let message = payload.message.as_deref().unwrap_or_default();
    let decoded = first_non_empty(&[payload.decoded.as_deref(), payload.message.as_deref()]);
    let hex = payload.hex.as_deref().unwrap_or_default();

    let mut line = format!("[{conn}] {}: ", payload.direction.to_uppercase());
    if !decoded.is_empty() && decoded != message {
        line.push_str(decoded);
        if !hex.is_empty() {
            line.push_str(&format!(" ({hex})"));
        }
    } else {
        line.push_str(first_non_empty(&[Some(message), Some(hex)]));
        if !hex.is_empty() && !message.is_empty() && hex != message {
            line.push_str(&format!(" ({hex})"));
        }
    }
    line
}

/// Map a `THROTTLE_UPDATED` property to a state patch. `F<n>Momentary` and
/// unknown properties yield nothing.
fn property_patch(property: &str, value: &Value) -> Option<ThrottlePatch> {
    match property {
        "SpeedSetting" => value.as_f64().map(ThrottlePatch::speed),
        "IsForward" => value.as_bool().map(ThrottlePatch::forward),
        _ => {
            if property.ends_with("Momentary") {
                return None;
            }
            let number = property.strip_prefix('F')?.parse::<u32>().ok()?;
            value.as_bool().map(|on| ThrottlePatch::function(number, on))
        }
    }
}

/// Render a JSON value the way a console line shows it (strings unquoted).
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
