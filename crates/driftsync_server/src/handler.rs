//! Batch request handling.

use crate::authority::Authority;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use driftsync_protocol::{batch_checksum, BatchRequest, BatchResponse};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handler for batch submissions.
pub struct BatchHandler {
    config: ServerConfig,
    authority: Arc<Authority>,
}

impl BatchHandler {
    /// Creates a handler over `authority`.
    pub fn new(config: ServerConfig, authority: Arc<Authority>) -> Self {
        Self { config, authority }
    }

    /// The authority this handler writes to.
    pub fn authority(&self) -> &Arc<Authority> {
        &self.authority
    }

    /// The handler's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Validates a batch and applies its mutations in order.
    ///
    /// `header_checksum` is the checksum sent alongside the body, if any.
    /// The response carries one outcome per mutation, in request order.
    pub fn handle_batch(
        &self,
        request: &BatchRequest,
        header_checksum: Option<&str>,
    ) -> ServerResult<BatchResponse> {
        if request.len() > self.config.max_batch {
            return Err(ServerError::BatchTooLarge {
                size: request.len(),
                max: self.config.max_batch,
            });
        }

        if self.config.verify_checksum {
            let expected = batch_checksum(&request.mutations);
            let claimed = header_checksum.unwrap_or(&request.checksum);
            if claimed != expected || request.checksum != expected {
                warn!(client_id = %request.client_id, "batch checksum mismatch");
                return Err(ServerError::ChecksumMismatch {
                    expected,
                    actual: claimed.to_string(),
                });
            }
        }

        debug!(
            client_id = %request.client_id,
            mutations = request.len(),
            "applying batch"
        );

        let outcomes = request
            .mutations
            .iter()
            .map(|m| self.authority.apply(&request.client_id, m))
            .collect();
        Ok(BatchResponse::new(outcomes))
    }
}
