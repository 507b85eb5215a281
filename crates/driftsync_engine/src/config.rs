//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use std::time::Duration;

/// Configuration for sync passes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote authority.
    pub server_url: String,
    /// Identifier sent with every batch.
    pub client_id: String,
    /// Maximum mutations per batch.
    pub batch_size: usize,
    /// Failed attempts after which a mutation is dead-lettered.
    pub max_retries: u32,
    /// Timeout for the connectivity probe.
    pub probe_timeout: Duration,
    /// Timeout for one batch submission.
    pub dispatch_timeout: Duration,
    /// Health endpoint, relative to `server_url`.
    pub health_path: String,
    /// Batch endpoint, relative to `server_url`.
    pub batch_path: String,
    /// Skip an entity's later batches within a pass once one of its
    /// mutations failed.
    pub hold_back_after_failure: bool,
    /// Re-enqueue the merged fields when a conflict resolves in favour of
    /// the local version.
    pub requeue_local_wins: bool,
    /// Backoff between unsuccessful passes in a watch loop.
    pub backoff: BackoffConfig,
    /// Interval for scheduled passes.
    pub sync_interval: Option<Duration>,
}

impl SyncConfig {
    /// Creates a configuration for the given remote authority.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            client_id: uuid::Uuid::new_v4().to_string(),
            batch_size: 50,
            max_retries: 3,
            probe_timeout: Duration::from_secs(5),
            dispatch_timeout: Duration::from_secs(30),
            health_path: "/health".into(),
            batch_path: "/sync/batch".into(),
            hold_back_after_failure: true,
            requeue_local_wins: true,
            backoff: BackoffConfig::default(),
            sync_interval: None,
        }
    }

    /// Sets the client identifier.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the batch dispatch timeout.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Sets the health and batch endpoint paths.
    pub fn with_paths(mut self, health: impl Into<String>, batch: impl Into<String>) -> Self {
        self.health_path = health.into();
        self.batch_path = batch.into();
        self
    }

    /// Enables or disables holding back an entity after a failure.
    pub fn with_hold_back_after_failure(mut self, enabled: bool) -> Self {
        self.hold_back_after_failure = enabled;
        self
    }

    /// Enables or disables re-pushing local conflict winners.
    pub fn with_requeue_local_wins(mut self, enabled: bool) -> Self {
        self.requeue_local_wins = enabled;
        self
    }

    /// Sets the backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the interval for scheduled passes.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Full URL of the health endpoint.
    pub fn health_url(&self) -> String {
        join_url(&self.server_url, &self.health_path)
    }

    /// Full URL of the batch endpoint.
    pub fn batch_url(&self) -> String {
        join_url(&self.server_url, &self.batch_path)
    }

    /// Checks the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] describing the first invalid field.
    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(SyncError::Config("max_retries must be at least 1".into()));
        }
        if self.probe_timeout.is_zero() || self.dispatch_timeout.is_zero() {
            return Err(SyncError::Config("timeouts must be non-zero".into()));
        }
        for path in [&self.health_path, &self.batch_path] {
            if !path.starts_with('/') {
                return Err(SyncError::Config(format!(
                    "endpoint path {path:?} must start with '/'"
                )));
            }
        }
        if self.client_id.is_empty() {
            return Err(SyncError::Config("client_id must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Exponential backoff between unsuccessful passes.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the delay (before jitter).
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Whether to add up to 25% random jitter.
    pub add_jitter: bool,
}

impl BackoffConfig {
    /// Creates a backoff starting at `initial_delay`.
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Delay to wait after `failures` consecutive failures.
    ///
    /// Zero failures means no delay.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay_secs = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.dispatch_timeout, Duration::from_secs(30));
        assert!(config.hold_back_after_failure);
        assert!(config.requeue_local_wins);
        assert!(config.sync_interval.is_none());
        assert!(uuid::Uuid::parse_str(&config.client_id).is_ok());
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://sync.example.com/")
            .with_client_id("laptop")
            .with_batch_size(10)
            .with_max_retries(5)
            .with_dispatch_timeout(Duration::from_secs(60))
            .with_sync_interval(Duration::from_secs(15));

        assert_eq!(config.client_id, "laptop");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.dispatch_timeout, Duration::from_secs(60));
        assert_eq!(config.sync_interval, Some(Duration::from_secs(15)));
        assert_eq!(config.health_url(), "https://sync.example.com/health");
        assert_eq!(config.batch_url(), "https://sync.example.com/sync/batch");
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(SyncConfig::new("http://h").validate().is_ok());
        assert!(SyncConfig::new("http://h")
            .with_batch_size(0)
            .validate()
            .is_err());
        assert!(SyncConfig::new("http://h")
            .with_max_retries(0)
            .validate()
            .is_err());
        assert!(SyncConfig::new("http://h")
            .with_probe_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(matches!(
            SyncConfig::new("http://h").with_paths("health", "/b").validate(),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = BackoffConfig::new(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(false);

        assert_eq!(backoff.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn backoff_jitter_is_bounded() {
        let backoff = BackoffConfig::new(Duration::from_millis(100));
        for _ in 0..20 {
            let delay = backoff.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }
}
