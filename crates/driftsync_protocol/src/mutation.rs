//! Queued mutations and dead-letter entries.

use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field-level snapshot of an entity, keyed by field name.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Kind of change a mutation describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Entity was created locally. Payload is the full entity.
    Create,
    /// Entity was changed locally. Payload holds only the changed fields.
    Update,
    /// Entity was deleted locally. Payload is the last known state.
    Delete,
}

impl Operation {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Converts to a numeric code.
    pub fn to_code(&self) -> u8 {
        match self {
            Operation::Create => 1,
            Operation::Update => 2,
            Operation::Delete => 3,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Operation::Create),
            2 => Some(Operation::Update),
            3 => Some(Operation::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(ProtocolError::UnknownOperation(other.to_string())),
        }
    }
}

/// One pending local change waiting to be confirmed by the remote authority.
///
/// # Fields
///
/// - `id`: store-assigned, strictly increasing in insertion order
/// - `entity_id`: the entity affected
/// - `operation`: create, update or delete
/// - `payload`: the field snapshot for the change
/// - `created_at`: ordering key, never earlier than the previous append
/// - `retry_count`: failed attempts so far
/// - `error_message`: reason of the last failed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Queue entry ID.
    pub id: u64,
    /// Affected entity.
    pub entity_id: String,
    /// Operation type.
    pub operation: Operation,
    /// Field snapshot.
    pub payload: Fields,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Failed attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Reason of the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl QueuedMutation {
    /// Creates a fresh mutation with no failed attempts.
    pub fn new(
        id: u64,
        entity_id: impl Into<String>,
        operation: Operation,
        payload: Fields,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            entity_id: entity_id.into(),
            operation,
            payload,
            created_at,
            retry_count: 0,
            error_message: None,
        }
    }

    /// Returns true if this entry may still be dispatched.
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }
}

/// A mutation that exhausted its retries. Terminal: never replayed automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Dead-letter entry ID.
    pub id: u64,
    /// ID of the queue entry this was moved from.
    pub original_id: u64,
    /// Affected entity.
    pub entity_id: String,
    /// Operation type.
    pub operation: Operation,
    /// Field snapshot.
    pub payload: Fields,
    /// Creation time of the original mutation.
    pub created_at: DateTime<Utc>,
    /// Retry count at the time of escalation.
    pub retry_count: u32,
    /// Error that triggered escalation.
    pub error_message: String,
    /// When the mutation was escalated.
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Builds a dead-letter entry from a queue entry, copying it verbatim.
    pub fn from_mutation(
        id: u64,
        mutation: &QueuedMutation,
        retry_count: u32,
        error_message: impl Into<String>,
        failed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            original_id: mutation.id,
            entity_id: mutation.entity_id.clone(),
            operation: mutation.operation,
            payload: mutation.payload.clone(),
            created_at: mutation.created_at,
            retry_count,
            error_message: error_message.into(),
            failed_at,
        }
    }
}
