//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use driftsync_protocol::{BatchRequest, BatchResponse, ItemOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A sync transport handles network communication with the remote
/// authority.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process, mock for testing).
pub trait SyncTransport: Send + Sync {
    /// Probes the remote authority's health endpoint.
    ///
    /// Must return within roughly `timeout`.
    fn health(&self, timeout: Duration) -> SyncResult<()>;

    /// Submits one batch and returns the positional outcomes.
    ///
    /// Must return within roughly `timeout`. An `Err` means the whole
    /// batch failed in transit.
    fn submit_batch(&self, request: &BatchRequest, timeout: Duration)
        -> SyncResult<BatchResponse>;
}

type Responder = Box<dyn Fn(&BatchRequest) -> SyncResult<BatchResponse> + Send + Sync>;

/// A scriptable transport for testing.
///
/// Batch submissions are answered, in order of preference, by queued
/// scripted results, by a responder closure, or with a success outcome for
/// every mutation.
pub struct MockTransport {
    reachable: AtomicBool,
    scripted: Mutex<VecDeque<SyncResult<BatchResponse>>>,
    responder: Mutex<Option<Responder>>,
    requests: Mutex<Vec<BatchRequest>>,
    health_calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

impl MockTransport {
    /// Creates a reachable mock transport.
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            scripted: Mutex::new(VecDeque::new()),
            responder: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            health_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    /// Sets whether the remote is reachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Queues a response for the next unanswered submission.
    pub fn push_response(&self, response: BatchResponse) {
        self.scripted.lock().push_back(Ok(response));
    }

    /// Queues a transport failure for the next unanswered submission.
    pub fn push_failure(&self, error: SyncError) {
        self.scripted.lock().push_back(Err(error));
    }

    /// Answers submissions with `responder` once scripted results run out.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&BatchRequest) -> SyncResult<BatchResponse> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Box::new(responder));
    }

    /// Every batch submitted so far.
    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().clone()
    }

    /// Number of health probes.
    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Number of batch submissions.
    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Total network calls.
    pub fn network_calls(&self) -> usize {
        self.health_calls() + self.submit_calls()
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("reachable", &self.is_reachable())
            .field("health_calls", &self.health_calls())
            .field("submit_calls", &self.submit_calls())
            .finish_non_exhaustive()
    }
}

impl SyncTransport for MockTransport {
    fn health(&self, _timeout: Duration) -> SyncResult<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_reachable() {
            Ok(())
        } else {
            Err(SyncError::Connectivity("mock remote is unreachable".into()))
        }
    }

    fn submit_batch(
        &self,
        request: &BatchRequest,
        _timeout: Duration,
    ) -> SyncResult<BatchResponse> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_reachable() {
            return Err(SyncError::NotConnected);
        }
        self.requests.lock().push(request.clone());

        if let Some(scripted) = self.scripted.lock().pop_front() {
            return scripted;
        }
        if let Some(responder) = self.responder.lock().as_ref() {
            return responder(request);
        }
        Ok(BatchResponse::new(
            request
                .mutations
                .iter()
                .map(|m| ItemOutcome::success(format!("remote-{}", m.entity_id)))
                .collect(),
        ))
    }
}
