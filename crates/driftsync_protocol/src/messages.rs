//! Batch submission messages.

use crate::checksum::batch_checksum;
use crate::entity::RemoteState;
use crate::error::{ProtocolError, ProtocolResult};
use crate::mutation::QueuedMutation;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Reason used when the remote authority returned fewer outcomes than
/// mutations submitted.
pub const NO_RESPONSE_REASON: &str = "no response";

/// A batch of queued mutations sent to the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Identifier of the submitting client.
    pub client_id: String,
    /// Client wall-clock time at submission.
    pub client_timestamp: DateTime<Utc>,
    /// Checksum over the ordered mutations.
    pub checksum: String,
    /// The mutations, in dispatch order.
    pub mutations: Vec<QueuedMutation>,
}

impl BatchRequest {
    /// Creates a request, computing the checksum from the mutations.
    pub fn new(
        client_id: impl Into<String>,
        client_timestamp: DateTime<Utc>,
        mutations: Vec<QueuedMutation>,
    ) -> Self {
        let checksum = batch_checksum(&mutations);
        Self {
            client_id: client_id.into(),
            client_timestamp,
            checksum,
            mutations,
        }
    }

    /// Returns true if the carried checksum matches the carried mutations.
    pub fn checksum_matches(&self) -> bool {
        self.checksum == batch_checksum(&self.mutations)
    }

    /// Number of mutations in the batch.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns true if the batch carries no mutations.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// Outcome for one submitted mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The mutation was applied.
    Success {
        /// Identifier assigned by the remote authority.
        remote_id: String,
        /// Authoritative entity state after applying, if the remote sent it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolved: Option<RemoteState>,
    },
    /// The remote holds a diverging version of the entity.
    Conflict {
        /// The remote's current state.
        remote: RemoteState,
    },
    /// The mutation was rejected.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}

impl ItemOutcome {
    /// Creates a success outcome without resolved state.
    pub fn success(remote_id: impl Into<String>) -> Self {
        ItemOutcome::Success {
            remote_id: remote_id.into(),
            resolved: None,
        }
    }

    /// Creates a conflict outcome.
    pub fn conflict(remote: RemoteState) -> Self {
        ItemOutcome::Conflict { remote }
    }

    /// Creates an error outcome.
    pub fn error(reason: impl Into<String>) -> Self {
        ItemOutcome::Error {
            reason: reason.into(),
        }
    }

    /// The outcome synthesized for a position the remote did not answer.
    pub fn no_response() -> Self {
        Self::error(NO_RESPONSE_REASON)
    }

    /// Returns the status name.
    pub fn status(&self) -> &'static str {
        match self {
            ItemOutcome::Success { .. } => "success",
            ItemOutcome::Conflict { .. } => "conflict",
            ItemOutcome::Error { .. } => "error",
        }
    }
}

/// Positionally aligned outcomes for a [`BatchRequest`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    /// One outcome per submitted mutation, in submission order.
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchResponse {
    /// Creates a response.
    pub fn new(outcomes: Vec<ItemOutcome>) -> Self {
        Self { outcomes }
    }

    /// Returns the outcome for `position`, synthesizing an error when the
    /// remote sent fewer outcomes than mutations.
    pub fn outcome_at(&self, position: usize) -> ItemOutcome {
        self.outcomes
            .get(position)
            .cloned()
            .unwrap_or_else(ItemOutcome::no_response)
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// Encodes any serializable value to CBOR bytes.
pub fn encode_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decodes CBOR bytes into a value.
pub fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}
