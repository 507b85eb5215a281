//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so the engine does
//! not depend on a particular HTTP library. Bodies are CBOR; the batch
//! checksum travels both in the body and in the `X-Batch-Checksum` header.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use driftsync_protocol::{BatchRequest, BatchResponse, CHECKSUM_HEADER};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Content type of request and response bodies.
pub const CBOR_CONTENT_TYPE: &str = "application/cbor";

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations must honour `timeout` and report any network failure
/// (DNS, refusal, timeout) as `Err`.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, String>;

    /// Sends a POST request.
    fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<HttpResponse, String>;
}

/// HTTP-based sync transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    health_path: String,
    batch_path: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport with the default endpoint paths.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            health_path: "/health".into(),
            batch_path: "/sync/batch".into(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Creates a transport using the URL and paths of `config`.
    pub fn from_config(config: &SyncConfig, client: C) -> Self {
        let mut transport = Self::new(config.server_url.clone(), client);
        transport.health_path = config.health_path.clone();
        transport.batch_path = config.batch_path.clone();
        transport
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last network error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn record(&self, result: Result<HttpResponse, String>) -> SyncResult<HttpResponse> {
        match result {
            Ok(response) => {
                *self.last_error.write() = None;
                Ok(response)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(SyncError::Connectivity(e))
            }
        }
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn health(&self, timeout: Duration) -> SyncResult<()> {
        let url = self.url(&self.health_path);
        let response = self.record(self.client.get(&url, timeout))?;
        if response.is_success() {
            Ok(())
        } else {
            Err(SyncError::Connectivity(format!(
                "health check returned HTTP {}",
                response.status
            )))
        }
    }

    fn submit_batch(
        &self,
        request: &BatchRequest,
        timeout: Duration,
    ) -> SyncResult<BatchResponse> {
        let body = request
            .encode()
            .map_err(|e| SyncError::Codec(format!("failed to encode batch: {e}")))?;

        let url = self.url(&self.batch_path);
        let headers = [
            ("Content-Type", CBOR_CONTENT_TYPE),
            (CHECKSUM_HEADER, request.checksum.as_str()),
        ];
        debug!(url = %url, items = request.len(), checksum = %request.checksum, "posting batch");

        let response = self.record(self.client.post(&url, &headers, body, timeout))?;
        if !response.is_success() {
            return Err(SyncError::HttpStatus(response.status));
        }

        BatchResponse::decode(&response.body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode batch response: {e}")))
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a GET request.
    fn handle_get(&self, path: &str) -> HttpResponse;

    /// Handles a POST request.
    fn handle_post(&self, path: &str, headers: &[(&str, &str)], body: &[u8]) -> HttpResponse;
}

/// An HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing the full HTTP path without a socket.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    reachable: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a client connected to `server`.
    pub fn new(server: S) -> Self {
        Self {
            server,
            reachable: AtomicBool::new(true),
        }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }

    /// Simulates the network going down or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), String> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err("connection refused".into())
        }
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, String> {
        self.check_reachable()?;
        Ok(self.server.handle_get(path_of(url)))
    }

    fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
        _timeout: Duration,
    ) -> Result<HttpResponse, String> {
        self.check_reachable()?;
        Ok(self.server.handle_post(path_of(url), headers, &body))
    }
}

/// Path component of `url` (everything from the first `/` after the host).
fn path_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[after_scheme + i..],
        None => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use driftsync_protocol::{Fields, ItemOutcome, Operation, QueuedMutation};

    struct TestClient {
        status: u16,
        response: RwLock<Option<Vec<u8>>>,
        seen_headers: RwLock<Vec<(String, String)>>,
        seen_urls: RwLock<Vec<String>>,
    }

    impl TestClient {
        fn new(status: u16) -> Self {
            Self {
                status,
                response: RwLock::new(None),
                seen_headers: RwLock::new(Vec::new()),
                seen_urls: RwLock::new(Vec::new()),
            }
        }

        fn set_response(&self, body: Vec<u8>) {
            *self.response.write() = Some(body);
        }
    }

    impl HttpClient for TestClient {
        fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, String> {
            self.seen_urls.write().push(url.to_string());
            Ok(HttpResponse::new(self.status, Vec::new()))
        }

        fn post(
            &self,
            url: &str,
            headers: &[(&str, &str)],
            _body: Vec<u8>,
            _timeout: Duration,
        ) -> Result<HttpResponse, String> {
            self.seen_urls.write().push(url.to_string());
            *self.seen_headers.write() = headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let body = self
                .response
                .read()
                .clone()
                .ok_or_else(|| "no response set".to_string())?;
            Ok(HttpResponse::new(self.status, body))
        }
    }

    fn request() -> BatchRequest {
        let m = QueuedMutation::new(1, "task-1", Operation::Create, Fields::new(), Utc::now());
        BatchRequest::new("client", Utc::now(), vec![m])
    }

    #[test]
    fn path_extraction() {
        assert_eq!(path_of("http://localhost:8080/sync/batch"), "/sync/batch");
        assert_eq!(path_of("https://example.com/health"), "/health");
        assert_eq!(path_of("https://example.com"), "/");
        assert_eq!(path_of("/health"), "/health");
    }

    #[test]
    fn transport_health() {
        let transport = HttpTransport::new("https://sync.example.com/", TestClient::new(200));
        assert_eq!(transport.base_url(), "https://sync.example.com");
        assert!(transport.health(Duration::from_secs(1)).is_ok());
        assert_eq!(
            transport.client().seen_urls.read()[0],
            "https://sync.example.com/health"
        );

        let transport = HttpTransport::new("https://sync.example.com", TestClient::new(503));
        assert!(matches!(
            transport.health(Duration::from_secs(1)),
            Err(SyncError::Connectivity(_))
        ));
    }

    #[test]
    fn transport_submit_sends_checksum_header() {
        let client = TestClient::new(200);
        client.set_response(
            BatchResponse::new(vec![ItemOutcome::success("srv-1")])
                .encode()
                .unwrap(),
        );
        let transport = HttpTransport::new("https://sync.example.com", client);

        let req = request();
        let response = transport
            .submit_batch(&req, Duration::from_secs(1))
            .unwrap();
        assert_eq!(response.outcomes, vec![ItemOutcome::success("srv-1")]);

        let headers = transport.client().seen_headers.read().clone();
        assert!(headers.contains(&(CHECKSUM_HEADER.to_string(), req.checksum.clone())));
        assert!(headers.contains(&("Content-Type".to_string(), CBOR_CONTENT_TYPE.to_string())));
    }

    #[test]
    fn transport_non_success_status_fails_batch() {
        let client = TestClient::new(500);
        client.set_response(Vec::new());
        let transport = HttpTransport::new("https://sync.example.com", client);
        let result = transport.submit_batch(&request(), Duration::from_secs(1));
        assert!(matches!(result, Err(SyncError::HttpStatus(500))));
    }

    #[test]
    fn transport_garbage_body_is_protocol_error() {
        let client = TestClient::new(200);
        client.set_response(vec![0xff, 0x00, 0x13]);
        let transport = HttpTransport::new("https://sync.example.com", client);
        let result = transport.submit_batch(&request(), Duration::from_secs(1));
        assert!(matches!(result, Err(SyncError::Protocol(_))));
    }

    #[test]
    fn transport_records_network_error() {
        let transport = HttpTransport::new("https://sync.example.com", TestClient::new(200));
        let result = transport.submit_batch(&request(), Duration::from_secs(1));
        assert!(matches!(result, Err(SyncError::Connectivity(_))));
        assert_eq!(transport.last_error().as_deref(), Some("no response set"));
    }
}
