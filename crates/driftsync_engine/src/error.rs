//! Error types for the sync engine.

use crate::report::PassErrorKind;
use driftsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote authority could not be reached.
    #[error("remote unreachable: {0}")]
    Connectivity(String),

    /// The remote authority answered with a non-success HTTP status.
    #[error("remote returned HTTP {0}")]
    HttpStatus(u16),

    /// The remote authority rejected a mutation.
    #[error("remote rejected mutation: {0}")]
    RemoteRejection(String),

    /// Missing or malformed response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Queue or dead-letter storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The entity service failed.
    #[error("entity service error: {0}")]
    Entity(String),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(String),

    /// A network call exceeded its timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Another sync pass is already running.
    #[error("a sync pass is already in progress")]
    PassInProgress,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A mutation was enqueued without an entity id.
    #[error("entity id must not be empty")]
    InvalidEntityId,
}

impl SyncError {
    /// Returns true if a later pass may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Connectivity(_)
            | SyncError::HttpStatus(_)
            | SyncError::RemoteRejection(_)
            | SyncError::Protocol(_)
            | SyncError::Timeout
            | SyncError::NotConnected
            | SyncError::PassInProgress => true,
            SyncError::Storage(StoreError::Io(_)) => true,
            _ => false,
        }
    }

    /// Category used when this error is reported against a mutation.
    pub fn kind(&self) -> PassErrorKind {
        match self {
            SyncError::Connectivity(_) | SyncError::Timeout | SyncError::NotConnected => {
                PassErrorKind::Connectivity
            }
            SyncError::HttpStatus(_) | SyncError::RemoteRejection(_) => {
                PassErrorKind::RemoteRejection
            }
            SyncError::Protocol(_) | SyncError::Codec(_) => PassErrorKind::Protocol,
            _ => PassErrorKind::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::Connectivity("refused".into()).is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::HttpStatus(503).is_retryable());
        assert!(SyncError::PassInProgress.is_retryable());
        assert!(!SyncError::InvalidEntityId.is_retryable());
        assert!(!SyncError::Config("x".into()).is_retryable());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(SyncError::Timeout.kind(), PassErrorKind::Connectivity);
        assert_eq!(
            SyncError::HttpStatus(500).kind(),
            PassErrorKind::RemoteRejection
        );
        assert_eq!(
            SyncError::Protocol("bad cbor".into()).kind(),
            PassErrorKind::Protocol
        );
        assert_eq!(SyncError::Entity("gone".into()).kind(), PassErrorKind::Local);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SyncError::NotConnected.to_string(),
            "not connected to server"
        );
        let err: SyncError = StoreError::Codec("truncated".into()).into();
        assert!(err.to_string().contains("truncated"));
        assert!(!err.is_retryable());
    }
}
