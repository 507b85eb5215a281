//! In-memory store for testing.

use crate::error::StoreResult;
use crate::store::SyncStore;
use crate::tables::{JournalRecord, Tables};
use chrono::{DateTime, Utc};
use driftsync_protocol::{DeadLetterEntry, Fields, Operation, QueuedMutation};
use parking_lot::RwLock;

/// An in-memory store.
///
/// Suitable for unit tests, integration tests and clients that do not need
/// their queue to survive a restart.
///
/// # Thread Safety
///
/// Every operation takes the table lock once, so each call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, record: &JournalRecord) {
        self.tables.write().apply(record);
    }
}

impl SyncStore for MemoryStore {
    fn append_mutation(
        &self,
        entity_id: &str,
        operation: Operation,
        payload: Fields,
        requested_at: DateTime<Utc>,
    ) -> StoreResult<QueuedMutation> {
        let mut tables = self.tables.write();
        let m = tables.plan_append(entity_id, operation, payload, requested_at);
        tables.apply(&JournalRecord::Append(m.clone()));
        Ok(m)
    }

    fn mutations(&self) -> StoreResult<Vec<QueuedMutation>> {
        Ok(self.tables.read().mutations())
    }

    fn get_mutation(&self, id: u64) -> StoreResult<Option<QueuedMutation>> {
        Ok(self.tables.read().get_mutation(id))
    }

    fn record_failure(
        &self,
        id: u64,
        retry_count: u32,
        error_message: &str,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        match tables.plan_failure(id, retry_count, error_message) {
            Some(record) => {
                tables.apply(&record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_mutation(&self, id: u64) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        match tables.plan_remove(id) {
            Some(record) => {
                tables.apply(&record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn move_to_dead_letter(
        &self,
        id: u64,
        retry_count: u32,
        error_message: &str,
        failed_at: DateTime<Utc>,
    ) -> StoreResult<Option<DeadLetterEntry>> {
        let mut tables = self.tables.write();
        let entry = tables.plan_dead_letter(id, retry_count, error_message, failed_at);
        if let Some(entry) = &entry {
            tables.apply(&JournalRecord::DeadLetter(entry.clone()));
        }
        Ok(entry)
    }

    fn dead_letters(&self) -> StoreResult<Vec<DeadLetterEntry>> {
        Ok(self.tables.read().dead_letters())
    }

    fn remove_dead_letter(&self, id: u64) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        match tables.plan_remove_dead_letter(id) {
            Some(record) => {
                tables.apply(&record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn replay_dead_letter(
        &self,
        id: u64,
        requested_at: DateTime<Utc>,
    ) -> StoreResult<Option<QueuedMutation>> {
        let mut tables = self.tables.write();
        let m = tables.plan_replay(id, requested_at);
        if let Some(m) = &m {
            tables.apply(&JournalRecord::Replay {
                dead_letter_id: id,
                mutation: m.clone(),
            });
        }
        Ok(m)
    }

    fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.tables.read().pending_count())
    }

    fn dead_letter_count(&self) -> StoreResult<usize> {
        Ok(self.tables.read().dead_letter_count())
    }

    fn last_sync_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.tables.read().last_sync_at())
    }

    fn set_last_sync_at(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.apply(&JournalRecord::LastSync { at });
        Ok(())
    }
}
