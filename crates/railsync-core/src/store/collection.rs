// ── Generic reactive keyed collection ──
//
// Concurrent keyed storage with push-based change notification via
// `watch` channels. Snapshots are ordered by key so consumers see a
// stable listing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A reactive collection for a single entity type.
///
/// Uses `DashMap` for concurrent lookups and a `watch` channel carrying a
/// key-ordered snapshot that is rebuilt on every mutation.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or update an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.rebuild_snapshot();
        is_new
    }

    /// Update an entity in place. Returns `false` when the key is absent.
    pub(crate) fn modify(&self, key: &str, f: impl FnOnce(&mut T)) -> bool {
        let Some(mut entry) = self.by_key.get_mut(key) else {
            return false;
        };
        f(Arc::make_mut(entry.value_mut()));
        drop(entry);
        self.rebuild_snapshot();
        true
    }

    /// Replace the whole collection in one step; subscribers see a single
    /// change.
    pub(crate) fn replace_all(&self, entries: impl IntoIterator<Item = (String, T)>) {
        self.by_key.clear();
        for (key, entity) in entries {
            self.by_key.insert(key, Arc::new(entity));
        }
        self.rebuild_snapshot();
    }

    pub(crate) fn get_by_key(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_keys() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.upsert("a".into(), "x".into()));
        assert!(!col.upsert("a".into(), "y".into()));
        assert_eq!(*col.get_by_key("a").unwrap(), "y");
    }

    #[test]
    fn replace_all_drops_missing_keys() {
        let col: EntityCollection<u32> = EntityCollection::new();
        col.upsert("a".into(), 1);
        col.upsert("b".into(), 2);

        col.replace_all([("c".to_string(), 3)]);

        assert_eq!(col.len(), 1);
        assert!(col.get_by_key("a").is_none());
        assert_eq!(col.snapshot().iter().map(|v| **v).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn modify_touches_only_existing_keys() {
        let col: EntityCollection<u32> = EntityCollection::new();
        col.upsert("a".into(), 1);
        assert!(col.modify("a", |v| *v = 10));
        assert!(!col.modify("missing", |v| *v = 99));
        assert_eq!(*col.get_by_key("a").unwrap(), 10);
    }

    #[test]
    fn snapshot_is_key_ordered_and_notifies() {
        let col: EntityCollection<&'static str> = EntityCollection::new();
        let mut rx = col.subscribe();
        col.upsert("b".into(), "second");
        col.upsert("a".into(), "first");

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.iter().map(|v| **v).collect::<Vec<_>>(), vec!["first", "second"]);
    }
}
