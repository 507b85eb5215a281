//! Error types for the reference server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The batch checksum does not match its contents.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum computed from the received mutations.
        expected: String,
        /// Checksum the client sent.
        actual: String,
    },

    /// The batch exceeds the configured maximum.
    #[error("batch too large: {size} > {max}")]
    BatchTooLarge {
        /// Submitted mutations.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::ChecksumMismatch { .. }
                | ServerError::BatchTooLarge { .. }
        )
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::ChecksumMismatch { .. } => 422,
            ServerError::BatchTooLarge { .. } => 413,
            ServerError::Codec(_) => 500,
        }
    }
}
