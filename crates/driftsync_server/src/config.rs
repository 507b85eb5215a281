//! Server configuration.

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum mutations per batch.
    pub max_batch: usize,
    /// Whether to reject batches whose checksum does not match.
    pub verify_checksum: bool,
    /// Prefix of assigned remote identifiers.
    pub id_prefix: String,
}

impl ServerConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            max_batch: 500,
            verify_checksum: true,
            id_prefix: "srv-".into(),
        }
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }

    /// Enables or disables checksum verification.
    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Sets the remote identifier prefix.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_batch, 500);
        assert!(config.verify_checksum);
        assert_eq!(config.id_prefix, "srv-");
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_batch(10)
            .with_verify_checksum(false)
            .with_id_prefix("r");
        assert_eq!(config.max_batch, 10);
        assert!(!config.verify_checksum);
        assert_eq!(config.id_prefix, "r");
    }
}
