//! The client data directory.
//!
//! Layout:
//! - `queue/` - the [`FileStore`] journal and lock
//! - `entities.json` - local entity records
//! - `client_id` - identifier sent with every batch

use driftsync_engine::MemoryEntityService;
use driftsync_protocol::EntityRecord;
use driftsync_store::{FileStore, StoreError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ENTITIES_FILE: &str = "entities.json";
const CLIENT_ID_FILE: &str = "client_id";
const QUEUE_DIR: &str = "queue";

/// Errors reading or writing the data directory.
#[derive(Error, Debug)]
pub enum DataError {
    /// The queue store failed.
    #[error("queue store: {0}")]
    Store(#[from] StoreError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entities file is malformed.
    #[error("entities file: {0}")]
    Json(#[from] serde_json::Error),
}

/// A client data directory.
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Opens `root`, creating it if needed.
    pub fn open(root: &Path) -> Result<Self, DataError> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Opens the queue store. Fails if another process holds it.
    pub fn store(&self) -> Result<FileStore, DataError> {
        Ok(FileStore::open(&self.root.join(QUEUE_DIR))?)
    }

    /// Loads local entity records.
    pub fn load_entities(&self) -> Result<MemoryEntityService, DataError> {
        let path = self.root.join(ENTITIES_FILE);
        if !path.exists() {
            return Ok(MemoryEntityService::new());
        }
        let records: Vec<EntityRecord> = serde_json::from_slice(&fs::read(&path)?)?;
        Ok(MemoryEntityService::from_records(records))
    }

    /// Writes local entity records, replacing the previous file atomically.
    pub fn save_entities(&self, entities: &MemoryEntityService) -> Result<(), DataError> {
        let path = self.root.join(ENTITIES_FILE);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(&entities.records())?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Returns the persisted client id, generating one on first use.
    pub fn client_id(&self) -> Result<String, DataError> {
        let path = self.root.join(CLIENT_ID_FILE);
        if path.exists() {
            let id = fs::read_to_string(&path)?.trim().to_string();
            if !id.is_empty() {
                return Ok(id);
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        fs::write(&path, &id)?;
        Ok(id)
    }
}
