//! Results and statistics reported by the sync engine.

use crate::state::SyncState;
use chrono::{DateTime, Utc};
use driftsync_protocol::GLOBAL_ENTITY;
use std::fmt;
use std::time::Duration;

/// Category of a pass error entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassErrorKind {
    /// The remote authority was unreachable or timed out.
    Connectivity,
    /// A conflict was resolved. Informational, never a failure.
    Conflict,
    /// The remote authority rejected the mutation.
    RemoteRejection,
    /// The response was missing or malformed.
    Protocol,
    /// A local collaborator failed.
    Local,
}

impl PassErrorKind {
    /// Returns the kind's name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PassErrorKind::Connectivity => "connectivity",
            PassErrorKind::Conflict => "conflict",
            PassErrorKind::RemoteRejection => "remote_rejection",
            PassErrorKind::Protocol => "protocol",
            PassErrorKind::Local => "local",
        }
    }
}

impl fmt::Display for PassErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a pass's error list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassError {
    /// Entity the entry concerns, or `"global"` for pass-level errors.
    pub entity_id: String,
    /// Mutation the entry concerns, if any.
    pub mutation_id: Option<u64>,
    /// Category.
    pub kind: PassErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl PassError {
    /// Creates an entry for a mutation.
    pub fn for_mutation(
        entity_id: impl Into<String>,
        mutation_id: u64,
        kind: PassErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            mutation_id: Some(mutation_id),
            kind,
            message: message.into(),
        }
    }

    /// Creates a pass-level entry.
    pub fn global(kind: PassErrorKind, message: impl Into<String>) -> Self {
        Self {
            entity_id: GLOBAL_ENTITY.to_string(),
            mutation_id: None,
            kind,
            message: message.into(),
        }
    }

    /// Returns true for informational entries.
    pub fn is_informational(&self) -> bool {
        self.kind == PassErrorKind::Conflict
    }
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mutation_id {
            Some(id) => write!(
                f,
                "[{}] {} (mutation {}): {}",
                self.kind, self.entity_id, id, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.kind, self.entity_id, self.message),
        }
    }
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncPassResult {
    /// True iff no mutation failed and the remote authority was reachable.
    pub success: bool,
    /// Mutations confirmed by the remote authority, including resolved
    /// conflicts.
    pub synced_items: usize,
    /// Mutations that received an error outcome.
    pub failed_items: usize,
    /// Error entries, including informational conflict entries.
    pub errors: Vec<PassError>,
    /// Conflicts resolved in this pass.
    pub conflicts_resolved: usize,
    /// Mutations moved to the dead-letter store in this pass.
    pub dead_lettered: usize,
    /// Mutations left queued because an earlier mutation for the same
    /// entity failed in this pass.
    pub held_back_items: usize,
    /// Batches submitted.
    pub batches_sent: usize,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

impl SyncPassResult {
    /// A successful pass that had nothing to do.
    pub fn empty() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A pass aborted because the remote authority was unreachable.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![PassError::global(PassErrorKind::Connectivity, message)],
            ..Self::default()
        }
    }

    /// Error entries that are not informational.
    pub fn failures(&self) -> impl Iterator<Item = &PassError> {
        self.errors.iter().filter(|e| !e.is_informational())
    }
}

/// Cumulative statistics across passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes run, including aborted ones.
    pub passes: u64,
    /// Passes aborted by an unreachable remote.
    pub passes_unreachable: u64,
    /// Mutations synced.
    pub synced: u64,
    /// Error outcomes.
    pub failed: u64,
    /// Conflicts resolved.
    pub conflicts: u64,
    /// Mutations dead-lettered.
    pub dead_lettered: u64,
    /// Batches submitted.
    pub batches: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Snapshot returned by [`crate::SyncEngine::sync_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatusReport {
    /// Queued mutations.
    pub pending: usize,
    /// Mutations fetched by the running pass and not yet reconciled.
    pub in_progress: usize,
    /// Dead-letter entries.
    pub dead_letter_count: usize,
    /// Completion time of the last pass that reached the remote authority.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Current engine state.
    pub state: SyncState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_result_has_one_global_error() {
        let result = SyncPassResult::unreachable("connection refused");
        assert!(!result.success);
        assert_eq!(result.synced_items, 0);
        assert_eq!(result.failed_items, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].entity_id, "global");
        assert_eq!(result.errors[0].kind, PassErrorKind::Connectivity);
        assert!(result.errors[0].mutation_id.is_none());
    }

    #[test]
    fn conflict_entries_are_informational() {
        let result = SyncPassResult {
            errors: vec![
                PassError::for_mutation("a", 1, PassErrorKind::Conflict, "local won"),
                PassError::for_mutation("b", 2, PassErrorKind::RemoteRejection, "invalid"),
            ],
            ..SyncPassResult::empty()
        };
        let failures: Vec<_> = result.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].entity_id, "b");
    }

    #[test]
    fn pass_error_display() {
        let e = PassError::for_mutation("task-1", 7, PassErrorKind::Protocol, "no response");
        assert_eq!(e.to_string(), "[protocol] task-1 (mutation 7): no response");
        let e = PassError::global(PassErrorKind::Connectivity, "down");
        assert_eq!(e.to_string(), "[connectivity] global: down");
    }
}
