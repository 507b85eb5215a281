//! The durable mutation queue.

use crate::error::{SyncError, SyncResult};
use chrono::Utc;
use driftsync_protocol::{Fields, Operation, QueuedMutation};
use driftsync_store::SyncStore;
use std::sync::Arc;
use tracing::debug;

/// Ordered record of pending entity changes.
///
/// The queue is a thin layer over a [`SyncStore`]: every method is one
/// atomic store operation, so enqueueing can interleave with a running
/// pass.
pub struct MutationQueue<S: SyncStore> {
    store: Arc<S>,
}

impl<S: SyncStore> MutationQueue<S> {
    /// Creates a queue over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Appends a mutation with `retry_count = 0`, stamped with the current
    /// time.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidEntityId`] for an empty `entity_id`, and
    /// storage errors unchanged.
    pub fn enqueue(
        &self,
        entity_id: &str,
        operation: Operation,
        payload: Fields,
    ) -> SyncResult<QueuedMutation> {
        if entity_id.is_empty() {
            return Err(SyncError::InvalidEntityId);
        }
        let m = self
            .store
            .append_mutation(entity_id, operation, payload, Utc::now())?;
        debug!(
            mutation_id = m.id,
            entity_id = %m.entity_id,
            operation = %m.operation,
            "enqueued mutation"
        );
        Ok(m)
    }

    /// Returns every mutation with `retry_count < max_retries`, grouped by
    /// entity and chronological within each entity.
    pub fn drain_eligible(&self, max_retries: u32) -> SyncResult<Vec<QueuedMutation>> {
        let mut eligible: Vec<_> = self
            .store
            .mutations()?
            .into_iter()
            .filter(|m| m.is_eligible(max_retries))
            .collect();
        sort_for_dispatch(&mut eligible);
        Ok(eligible)
    }

    /// Removes a mutation. Removing an unknown id is a no-op.
    pub fn remove(&self, id: u64) -> SyncResult<bool> {
        Ok(self.store.remove_mutation(id)?)
    }

    /// Stores a failed attempt on a mutation.
    pub fn record_failure(
        &self,
        id: u64,
        retry_count: u32,
        error_message: &str,
    ) -> SyncResult<bool> {
        Ok(self.store.record_failure(id, retry_count, error_message)?)
    }

    /// Returns one mutation.
    pub fn get(&self, id: u64) -> SyncResult<Option<QueuedMutation>> {
        Ok(self.store.get_mutation(id)?)
    }

    /// Number of queued mutations, eligible or not.
    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.store.pending_count()?)
    }

    /// Every queued mutation in insertion order.
    pub fn entries(&self) -> SyncResult<Vec<QueuedMutation>> {
        Ok(self.store.mutations()?)
    }
}

/// Orders mutations by `(entity_id, created_at, id)`.
pub(crate) fn sort_for_dispatch(mutations: &mut [QueuedMutation]) {
    mutations.sort_by(|a, b| {
        a.entity_id
            .cmp(&b.entity_id)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}
