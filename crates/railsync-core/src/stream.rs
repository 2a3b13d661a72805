// ── Registry subscriptions ──
//
// Follow the mirrored connection registry as a sequence of changes: which
// records appeared or changed, and which ids disappeared, relative to the
// previous snapshot this subscriber saw.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::ConnectionRecord;

type Snapshot = Arc<Vec<Arc<ConnectionRecord>>>;

/// One registry update as seen by a single subscriber.
#[derive(Debug, Clone)]
pub struct RegistryChange {
    /// The full registry after the update, sorted by id.
    pub snapshot: Snapshot,
    /// Records that are new or differ from the previous snapshot.
    pub updated: Vec<Arc<ConnectionRecord>>,
    /// Ids present before and missing now.
    pub removed: Vec<String>,
}

impl RegistryChange {
    fn between(previous: &[Arc<ConnectionRecord>], snapshot: Snapshot) -> Self {
        let updated = snapshot
            .iter()
            .filter(|record| {
                previous
                    .iter()
                    .find(|old| old.id == record.id)
                    .is_none_or(|old| old != *record)
            })
            .cloned()
            .collect();
        let removed = previous
            .iter()
            .filter(|old| snapshot.iter().all(|record| record.id != old.id))
            .map(|old| old.id.clone())
            .collect();
        Self {
            snapshot,
            updated,
            removed,
        }
    }

    /// A write that left every record as it was.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

/// A subscription to the connection registry.
///
/// Each subscriber diffs against the last snapshot it observed, so a slow
/// reader that skips intermediate writes still sees every net change.
pub struct ConnectionStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl ConnectionStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The registry as of creation or the last [`changed`](Self::changed).
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Wait for the next registry write. Returns `None` once the store has
    /// been dropped.
    pub async fn changed(&mut self) -> Option<RegistryChange> {
        self.receiver.changed().await.ok()?;
        let snapshot = self.receiver.borrow_and_update().clone();
        let change = RegistryChange::between(&self.current, Arc::clone(&snapshot));
        self.current = snapshot;
        Some(change)
    }

    /// Convert into a `Stream` of changes, starting after the current
    /// snapshot.
    pub fn into_stream(self) -> RegistryChanges {
        RegistryChanges {
            previous: self.current,
            inner: WatchStream::from_changes(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a [`RegistryChange`] per registry write.
pub struct RegistryChanges {
    previous: Snapshot,
    inner: WatchStream<Snapshot>,
}

impl Stream for RegistryChanges {
    type Item = RegistryChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let next = match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(next) => next,
            Poll::Pending => return Poll::Pending,
        };
        Poll::Ready(next.map(|snapshot| {
            let change = RegistryChange::between(&self.previous, Arc::clone(&snapshot));
            self.previous = snapshot;
            change
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use futures_util::StreamExt;

    use crate::MirrorStore;
    use crate::model::ConnectionRecord;

    fn record(id: &str, connected: bool) -> ConnectionRecord {
        ConnectionRecord {
            id: id.into(),
            system_type: "xnet-elite".into(),
            connected,
            command_station: None,
            power_status: None,
            roles: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn changed_reports_new_changed_and_removed_ids() {
        let store = MirrorStore::default();
        let mut sub = store.subscribe_connections();
        assert!(sub.current().is_empty());

        store.replace_connections(vec![record("cs1", true), record("z21", true)]);
        let change = sub.changed().await.unwrap();
        let ids: Vec<&str> = change.updated.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["cs1", "z21"]);
        assert!(change.removed.is_empty());

        store.replace_connections(vec![record("cs1", false)]);
        let change = sub.changed().await.unwrap();
        assert_eq!(change.updated.len(), 1);
        assert!(!change.updated[0].connected);
        assert_eq!(change.removed, ["z21"]);
        assert_eq!(sub.current().len(), 1);
    }

    #[tokio::test]
    async fn identical_poll_yields_an_empty_change() {
        let store = MirrorStore::default();
        store.replace_connections(vec![record("cs1", true)]);
        let mut changes = store.subscribe_connections().into_stream();

        store.replace_connections(vec![record("cs1", true)]);
        let change = changes.next().await.unwrap();
        assert!(change.is_empty());
        assert_eq!(change.snapshot.len(), 1);
    }
}
