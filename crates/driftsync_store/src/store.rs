//! Store trait definition.

use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use driftsync_protocol::{DeadLetterEntry, Fields, Operation, QueuedMutation};

/// Persistent tables used by the sync engine.
///
/// A store owns two tables, the mutation queue and the dead-letter store,
/// plus the timestamp of the last completed sync pass.
///
/// # Invariants
///
/// - Mutation IDs strictly increase in append order and are never reused
/// - `created_at` never decreases in append order
/// - Every method is one atomic transition; a concurrent caller observes
///   either the state before or the state after it
/// - Removing an unknown ID is a no-op, not an error
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - For testing
/// - [`crate::FileStore`] - For persistent storage
pub trait SyncStore: Send + Sync {
    /// Appends a mutation with `retry_count = 0`.
    ///
    /// `requested_at` is clamped so it is never earlier than the previous
    /// append's `created_at`.
    fn append_mutation(
        &self,
        entity_id: &str,
        operation: Operation,
        payload: Fields,
        requested_at: DateTime<Utc>,
    ) -> StoreResult<QueuedMutation>;

    /// Returns every queued mutation in insertion order.
    fn mutations(&self) -> StoreResult<Vec<QueuedMutation>>;

    /// Returns one queued mutation.
    fn get_mutation(&self, id: u64) -> StoreResult<Option<QueuedMutation>>;

    /// Stores a new retry count and error message on a queued mutation.
    ///
    /// Returns false if the mutation no longer exists.
    fn record_failure(&self, id: u64, retry_count: u32, error_message: &str)
        -> StoreResult<bool>;

    /// Removes a queued mutation. Returns false if it did not exist.
    fn remove_mutation(&self, id: u64) -> StoreResult<bool>;

    /// Moves a queued mutation into the dead-letter table in one step.
    ///
    /// Returns `None` if the mutation no longer exists.
    fn move_to_dead_letter(
        &self,
        id: u64,
        retry_count: u32,
        error_message: &str,
        failed_at: DateTime<Utc>,
    ) -> StoreResult<Option<DeadLetterEntry>>;

    /// Returns every dead-letter entry in escalation order.
    fn dead_letters(&self) -> StoreResult<Vec<DeadLetterEntry>>;

    /// Deletes a dead-letter entry. Returns false if it did not exist.
    fn remove_dead_letter(&self, id: u64) -> StoreResult<bool>;

    /// Moves a dead-letter entry back into the queue in one step.
    ///
    /// The entry's payload becomes a fresh mutation with a new id and
    /// `retry_count = 0`. Returns `None` if no entry has this id.
    fn replay_dead_letter(
        &self,
        id: u64,
        requested_at: DateTime<Utc>,
    ) -> StoreResult<Option<QueuedMutation>>;

    /// Number of queued mutations.
    fn pending_count(&self) -> StoreResult<usize>;

    /// Number of dead-letter entries.
    fn dead_letter_count(&self) -> StoreResult<usize>;

    /// When the last sync pass completed, if ever.
    fn last_sync_at(&self) -> StoreResult<Option<DateTime<Utc>>>;

    /// Records the completion time of a sync pass.
    fn set_last_sync_at(&self, at: DateTime<Utc>) -> StoreResult<()>;
}
