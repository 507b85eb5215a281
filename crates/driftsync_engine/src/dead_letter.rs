//! The dead-letter store.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use driftsync_protocol::{DeadLetterEntry, QueuedMutation};
use driftsync_store::SyncStore;
use std::sync::Arc;
use tracing::info;

/// Terminal holding area for mutations that exhausted their retries.
///
/// The engine only ever adds to this store. Purging and replaying entries
/// are operator actions.
pub struct DeadLetterStore<S: SyncStore> {
    store: Arc<S>,
}

impl<S: SyncStore> DeadLetterStore<S> {
    /// Creates a dead-letter store over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Moves `mutation` out of the queue and into the dead-letter table.
    ///
    /// Returns `None` if the mutation had already left the queue.
    pub fn escalate(
        &self,
        mutation: &QueuedMutation,
        retry_count: u32,
        error_message: &str,
        failed_at: DateTime<Utc>,
    ) -> SyncResult<Option<DeadLetterEntry>> {
        let entry =
            self.store
                .move_to_dead_letter(mutation.id, retry_count, error_message, failed_at)?;
        if let Some(entry) = &entry {
            info!(
                mutation_id = entry.original_id,
                entity_id = %entry.entity_id,
                retry_count,
                error = error_message,
                "mutation dead-lettered"
            );
        }
        Ok(entry)
    }

    /// Every entry, newest failure first.
    pub fn entries(&self) -> SyncResult<Vec<DeadLetterEntry>> {
        let mut entries = self.store.dead_letters()?;
        entries.sort_by(|a, b| b.failed_at.cmp(&a.failed_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    /// Number of entries.
    pub fn count(&self) -> SyncResult<usize> {
        Ok(self.store.dead_letter_count()?)
    }

    /// Deletes an entry. Deleting an unknown id is a no-op.
    pub fn remove(&self, id: u64) -> SyncResult<bool> {
        Ok(self.store.remove_dead_letter(id)?)
    }

    /// Re-enqueues an entry's payload as a fresh mutation and deletes the
    /// entry, as one store transition.
    ///
    /// Returns the new queue entry, or `None` if no entry has this id.
    pub fn replay(&self, id: u64) -> SyncResult<Option<QueuedMutation>> {
        let replayed = self.store.replay_dead_letter(id, Utc::now())?;
        if let Some(m) = &replayed {
            info!(
                dead_letter_id = id,
                mutation_id = m.id,
                entity_id = %m.entity_id,
                "replayed dead-letter entry"
            );
        }
        Ok(replayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use driftsync_protocol::{Fields, Operation};
    use driftsync_store::MemoryStore;
    use serde_json::json;

    fn setup() -> (Arc<MemoryStore>, DeadLetterStore<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Arc::clone(&store), DeadLetterStore::new(store))
    }

    fn append(store: &MemoryStore, entity: &str) -> QueuedMutation {
        let mut payload = Fields::new();
        payload.insert("entity".into(), json!(entity));
        store
            .append_mutation(entity, Operation::Update, payload, Utc::now())
            .unwrap()
    }

    #[test]
    fn escalate_preserves_mutation_fields() {
        let (store, dead) = setup();
        let m = append(&store, "a");

        let entry = dead.escalate(&m, 3, "rejected", Utc::now()).unwrap().unwrap();
        assert_eq!(entry.original_id, m.id);
        assert_eq!(entry.entity_id, m.entity_id);
        assert_eq!(entry.operation, m.operation);
        assert_eq!(entry.payload, m.payload);
        assert_eq!(entry.created_at, m.created_at);
        assert_eq!(entry.retry_count, 3);
        assert_eq!(entry.error_message, "rejected");
        assert_eq!(store.pending_count().unwrap(), 0);

        assert!(dead.escalate(&m, 3, "rejected", Utc::now()).unwrap().is_none());
        assert_eq!(dead.count().unwrap(), 1);
    }

    #[test]
    fn entries_are_newest_first() {
        let (store, dead) = setup();
        let now = Utc::now();
        let a = append(&store, "a");
        let b = append(&store, "b");
        let c = append(&store, "c");

        dead.escalate(&a, 3, "x", now - Duration::minutes(5)).unwrap();
        dead.escalate(&b, 3, "x", now).unwrap();
        dead.escalate(&c, 3, "x", now - Duration::minutes(1)).unwrap();

        let entities: Vec<_> = dead
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.entity_id)
            .collect();
        assert_eq!(entities, vec!["b", "c", "a"]);
    }

    #[test]
    fn replay_requeues_with_fresh_retry_budget() {
        let (store, dead) = setup();
        let m = append(&store, "a");
        let entry = dead.escalate(&m, 3, "x", Utc::now()).unwrap().unwrap();

        let replayed = dead.replay(entry.id).unwrap().unwrap();
        assert_ne!(replayed.id, m.id);
        assert_eq!(replayed.retry_count, 0);
        assert_eq!(replayed.payload, m.payload);
        assert_eq!(dead.count().unwrap(), 0);
        assert_eq!(store.pending_count().unwrap(), 1);

        assert!(dead.replay(entry.id).unwrap().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let (store, dead) = setup();
        let m = append(&store, "a");
        let entry = dead.escalate(&m, 3, "x", Utc::now()).unwrap().unwrap();
        assert!(dead.remove(entry.id).unwrap());
        assert!(!dead.remove(entry.id).unwrap());
    }
}
