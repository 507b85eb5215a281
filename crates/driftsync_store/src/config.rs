//! Configuration for the file store.

/// Configuration for [`crate::FileStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether every journal append is followed by `sync_data`.
    pub sync_on_write: bool,
    /// Number of superseded journal records tolerated before the journal
    /// is rewritten as a snapshot.
    pub compact_threshold: usize,
}

impl StoreConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            sync_on_write: true,
            compact_threshold: 1024,
        }
    }

    /// Sets whether appends are synced to disk.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Sets the compaction threshold.
    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_config_builder() {
        let config = StoreConfig::new()
            .with_sync_on_write(false)
            .with_compact_threshold(8);
        assert!(!config.sync_on_write);
        assert_eq!(config.compact_threshold, 8);

        let default = StoreConfig::default();
        assert!(default.sync_on_write);
        assert_eq!(default.compact_threshold, 1024);
    }
}
