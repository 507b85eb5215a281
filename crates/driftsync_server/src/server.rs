//! The reference server and its HTTP routing.

use crate::authority::Authority;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::BatchHandler;
use driftsync_protocol::{BatchRequest, BatchResponse, CHECKSUM_HEADER};
use std::sync::Arc;
use tracing::debug;

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Path of the batch endpoint.
pub const BATCH_PATH: &str = "/sync/batch";

/// A routed HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code.
    pub status: u16,
    /// Body bytes. CBOR for successful batch replies, UTF-8 text otherwise.
    pub body: Vec<u8>,
}

impl Reply {
    fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: message.into().into_bytes(),
        }
    }

    fn from_error(err: &ServerError) -> Self {
        Self::text(err.status_code(), err.to_string())
    }
}

/// The reference remote authority.
///
/// Routes are transport-agnostic: an HTTP front end passes the method,
/// path, headers and body to [`SyncServer::route`] and writes back the
/// [`Reply`].
///
/// # Example
///
/// ```
/// use driftsync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// assert_eq!(server.route("GET", "/health", &[], &[]).status, 200);
/// assert_eq!(server.route("GET", "/missing", &[], &[]).status, 404);
/// ```
pub struct SyncServer {
    handler: BatchHandler,
}

impl SyncServer {
    /// Creates a server with an empty authority.
    pub fn new(config: ServerConfig) -> Self {
        let authority = Arc::new(Authority::new(config.id_prefix.clone()));
        Self::with_authority(config, authority)
    }

    /// Creates a server over an existing authority.
    pub fn with_authority(config: ServerConfig, authority: Arc<Authority>) -> Self {
        Self {
            handler: BatchHandler::new(config, authority),
        }
    }

    /// The authority backing this server.
    pub fn authority(&self) -> &Arc<Authority> {
        self.handler.authority()
    }

    /// Handles a decoded batch.
    pub fn handle_batch(
        &self,
        request: &BatchRequest,
        header_checksum: Option<&str>,
    ) -> ServerResult<BatchResponse> {
        self.handler.handle_batch(request, header_checksum)
    }

    /// Answers the health endpoint.
    pub fn handle_health(&self) -> Reply {
        Reply::text(200, "ok")
    }

    /// Routes one HTTP request.
    pub fn route(&self, method: &str, path: &str, headers: &[(&str, &str)], body: &[u8]) -> Reply {
        debug!(method, path, bytes = body.len(), "routing request");
        match (method, path) {
            ("GET", HEALTH_PATH) => self.handle_health(),
            ("POST", BATCH_PATH) => self.route_batch(headers, body),
            _ => Reply::text(404, format!("no route for {method} {path}")),
        }
    }

    fn route_batch(&self, headers: &[(&str, &str)], body: &[u8]) -> Reply {
        let request = match BatchRequest::decode(body) {
            Ok(request) => request,
            Err(e) => return Reply::from_error(&ServerError::InvalidRequest(e.to_string())),
        };
        let header_checksum = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(CHECKSUM_HEADER))
            .map(|(_, value)| *value);

        let encoded = self
            .handle_batch(&request, header_checksum)
            .and_then(|response| {
                response
                    .encode()
                    .map_err(|e| ServerError::Codec(e.to_string()))
            });
        match encoded {
            Ok(body) => Reply { status: 200, body },
            Err(e) => Reply::from_error(&e),
        }
    }
}
