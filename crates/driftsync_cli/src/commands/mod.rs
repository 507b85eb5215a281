//! CLI command implementations.

pub mod dead_letters;
pub mod enqueue;
pub mod probe;
pub mod queue;
pub mod status;
pub mod sync;
pub mod watch;

use crate::client::ReqwestClient;
use crate::data::DataDir;
use driftsync_engine::{HttpTransport, MemoryEntityService, SyncConfig, SyncEngine};
use driftsync_store::FileStore;
use std::sync::Arc;
use std::time::Duration;

/// Result of a command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Engine wired to the on-disk queue and a real HTTP client.
pub type CliEngine = SyncEngine<FileStore, HttpTransport<ReqwestClient>, MemoryEntityService>;

/// Options for commands that talk to the remote authority.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Base URL of the remote authority.
    pub server: String,
    /// Override for the batch size.
    pub batch_size: Option<usize>,
    /// Override for the retry budget.
    pub max_retries: Option<u32>,
    /// Override for the dispatch timeout, in seconds.
    pub timeout_secs: Option<u64>,
    /// Seconds between scheduled passes.
    pub interval_secs: Option<u64>,
}

impl RemoteOptions {
    /// Builds the engine configuration for `client_id`.
    pub fn config(&self, client_id: String) -> SyncConfig {
        let mut config = SyncConfig::new(self.server.clone()).with_client_id(client_id);
        if let Some(size) = self.batch_size {
            config = config.with_batch_size(size);
        }
        if let Some(max) = self.max_retries {
            config = config.with_max_retries(max);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_dispatch_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.interval_secs {
            config = config.with_sync_interval(Duration::from_secs(secs));
        }
        config
    }
}

/// Opens the queue and entities under `data` and builds an engine.
pub fn build_engine(
    data: &DataDir,
    remote: &RemoteOptions,
) -> Result<(CliEngine, Arc<MemoryEntityService>), Box<dyn std::error::Error>> {
    let config = remote.config(data.client_id()?);
    let transport = Arc::new(HttpTransport::from_config(&config, ReqwestClient::new()?));
    let entities = Arc::new(data.load_entities()?);
    let engine = SyncEngine::new(
        config,
        Arc::new(data.store()?),
        transport,
        Arc::clone(&entities),
    )?;
    Ok((engine, entities))
}
