//! Scheduled sync passes.

use super::sync::print_pass;
use super::{build_engine, CommandResult, RemoteOptions};
use crate::data::DataDir;
use driftsync_engine::RetryPolicy;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before the next pass.
///
/// A successful pass waits `interval`. After `failures` unsuccessful passes
/// in a row the wait grows with the engine's backoff, never below
/// `interval`.
pub fn next_delay(policy: &RetryPolicy, interval: Duration, failures: u32) -> Duration {
    if failures == 0 {
        interval
    } else {
        interval.max(policy.delay_after_failures(failures))
    }
}

/// Runs sync passes on the configured interval until `passes` have run,
/// or forever when `passes` is `None`.
pub fn run(
    path: &Path,
    remote: &RemoteOptions,
    passes: Option<u64>,
    format: &str,
) -> CommandResult {
    let data = DataDir::open(path)?;
    let (engine, entities) = build_engine(&data, remote)?;
    let interval = engine.config().sync_interval.unwrap_or(DEFAULT_INTERVAL);

    info!(
        server = %remote.server,
        interval_secs = interval.as_secs(),
        "watching for changes"
    );
    let mut failures = 0u32;
    let mut completed = 0u64;
    loop {
        match engine.run_sync_pass() {
            Ok(result) => {
                data.save_entities(&entities)?;
                print_pass(&result, format)?;
                failures = if result.success {
                    0
                } else {
                    failures.saturating_add(1)
                };
            }
            Err(e) => {
                warn!(error = %e, "sync pass failed");
                failures = failures.saturating_add(1);
            }
        }

        completed += 1;
        if passes.is_some_and(|limit| completed >= limit) {
            return Ok(());
        }
        thread::sleep(next_delay(engine.retry_policy(), interval, failures));
    }
}
