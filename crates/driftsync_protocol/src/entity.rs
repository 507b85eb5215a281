//! Entity sync state as seen by the engine.

use crate::mutation::{Fields, QueuedMutation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sync status of a local entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local changes not yet confirmed.
    Pending,
    /// Local and remote agree.
    Synced,
    /// Last attempt failed; still retrying.
    Error,
    /// Retries exhausted; the mutation was dead-lettered.
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
            SyncStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A local entity, as exposed by the entity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Local identifier.
    pub id: String,
    /// Identifier assigned by the remote authority, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Content fields.
    pub fields: Fields,
    /// Sync status.
    pub sync_status: SyncStatus,
    /// Last local modification.
    pub updated_at: DateTime<Utc>,
    /// Last time the entity was confirmed by the remote authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl EntityRecord {
    /// Creates a pending entity.
    pub fn new(id: impl Into<String>, fields: Fields, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            remote_id: None,
            fields,
            sync_status: SyncStatus::Pending,
            updated_at,
            last_synced_at: None,
        }
    }

    /// Reconstructs the local side of a conflict from the queued mutation
    /// when the entity service no longer has the entity.
    pub fn from_mutation(mutation: &QueuedMutation) -> Self {
        Self::new(
            mutation.entity_id.clone(),
            mutation.payload.clone(),
            mutation.created_at,
        )
    }
}

/// The remote authority's view of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    /// Remote identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Content fields.
    pub fields: Fields,
    /// Last modification on the remote side.
    pub updated_at: DateTime<Utc>,
}

impl RemoteState {
    /// Creates a remote state.
    pub fn new(remote_id: Option<String>, fields: Fields, updated_at: DateTime<Utc>) -> Self {
        Self {
            remote_id,
            fields,
            updated_at,
        }
    }
}
