//! Connectivity probing.

use crate::transport::SyncTransport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    /// The health endpoint answered successfully.
    Reachable,
    /// The probe failed, with the reason.
    Unreachable(String),
}

impl Reachability {
    /// Returns true if the remote answered.
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable)
    }
}

/// Bounded-timeout reachability check against the remote authority.
pub struct ConnectivityProber<T: SyncTransport> {
    transport: Arc<T>,
    timeout: Duration,
}

impl<T: SyncTransport> ConnectivityProber<T> {
    /// Creates a prober.
    pub fn new(transport: Arc<T>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Probes the remote. Never fails: every error maps to
    /// [`Reachability::Unreachable`].
    pub fn probe(&self) -> Reachability {
        match self.transport.health(self.timeout) {
            Ok(()) => {
                debug!("remote authority reachable");
                Reachability::Reachable
            }
            Err(e) => {
                info!(error = %e, "remote authority unreachable");
                Reachability::Unreachable(e.to_string())
            }
        }
    }

    /// Returns true if the remote answered the probe.
    pub fn is_reachable(&self) -> bool {
        self.probe().is_reachable()
    }
}
