//! Connectivity probe command.

use super::CommandResult;
use crate::client::ReqwestClient;
use driftsync_engine::{ConnectivityProber, HttpTransport, Reachability};
use std::sync::Arc;
use std::time::Duration;

/// Checks whether the remote authority answers its health endpoint.
///
/// Fails when it does not, so scripts can branch on the exit code.
pub fn run(server: &str, timeout_secs: u64) -> CommandResult {
    let transport = Arc::new(HttpTransport::new(server, ReqwestClient::new()?));
    let prober = ConnectivityProber::new(transport, Duration::from_secs(timeout_secs));

    match prober.probe() {
        Reachability::Reachable => {
            println!("✓ {server} is reachable");
            Ok(())
        }
        Reachability::Unreachable(reason) => {
            println!("✗ {server} is unreachable: {reason}");
            Err(format!("remote unreachable: {reason}").into())
        }
    }
}
