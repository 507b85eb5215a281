//! Journal-backed durable store.
//!
//! Directory layout:
//!
//! ```text
//! <store_dir>/
//! ├─ LOCK            # Advisory lock, one process per directory
//! ├─ journal.log     # Append-only record journal
//! └─ journal.tmp     # Snapshot being written during compaction
//! ```
//!
//! Each journal frame is `magic (4) | payload len (u32 LE) | FNV-1a of
//! payload (u64 LE) | CBOR payload`. On open the journal is replayed
//! front to back; replay stops at the first incomplete or damaged frame and
//! the file is truncated there, so a crash mid-append loses at most the
//! record being written. A failed append is rolled back to the last whole
//! frame before the error is returned, and any tail left past that point is
//! cut off before the next append.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::SyncStore;
use crate::tables::{JournalRecord, Tables};
use chrono::{DateTime, Utc};
use driftsync_protocol::{
    decode_cbor, encode_cbor, fnv1a64, DeadLetterEntry, Fields, Operation, QueuedMutation,
};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";
const JOURNAL_TEMP: &str = "journal.tmp";

/// Magic bytes at the start of every journal frame.
const FRAME_MAGIC: [u8; 4] = *b"DSJR";
const HEADER_LEN: usize = 16;

struct Journal {
    file: File,
    tables: Tables,
    /// Frames currently in the journal file.
    records: usize,
    /// Byte length of the whole frames in the journal file.
    len: u64,
}

/// A durable store backed by an append-only journal.
///
/// # Durability
///
/// With `sync_on_write` (the default) every state transition is synced to
/// disk before the call returns.
///
/// # Thread Safety
///
/// All operations go through one internal lock; each call is atomic with
/// respect to other callers.
///
/// # Example
///
/// ```no_run
/// use chrono::Utc;
/// use driftsync_protocol::{Fields, Operation};
/// use driftsync_store::{FileStore, SyncStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("driftsync-data")).unwrap();
/// store
///     .append_mutation("task-1", Operation::Create, Fields::new(), Utc::now())
///     .unwrap();
/// ```
pub struct FileStore {
    path: PathBuf,
    config: StoreConfig,
    journal: Mutex<Journal>,
    _lock_file: File,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    /// Opens or creates a store in `path` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, another process
    /// holds it (`Locked`), or the journal cannot be read.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens or creates a store in `path`.
    ///
    /// # Errors
    ///
    /// See [`FileStore::open`].
    pub fn open_with_config(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path.to_path_buf()));
        }

        let journal_path = path.join(JOURNAL_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&journal_path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (tables, records, valid_len) = replay(&bytes);

        if valid_len < bytes.len() {
            warn!(
                path = %journal_path.display(),
                valid_len,
                file_len = bytes.len(),
                "truncating damaged journal tail"
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        debug!(
            path = %path.display(),
            records,
            pending = tables.pending_count(),
            dead_letters = tables.dead_letter_count(),
            "opened file store"
        );

        let store = Self {
            path: path.to_path_buf(),
            config,
            journal: Mutex::new(Journal {
                file,
                tables,
                records,
                len: valid_len as u64,
            }),
            _lock_file: lock_file,
        };

        {
            let mut journal = store.journal.lock();
            store.maybe_compact(&mut journal);
        }

        Ok(store)
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the journal as a snapshot of the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written or renamed.
    pub fn compact(&self) -> StoreResult<()> {
        let mut journal = self.journal.lock();
        self.compact_locked(&mut journal)
    }

    /// Number of frames in the journal file.
    #[must_use]
    pub fn journal_records(&self) -> usize {
        self.journal.lock().records
    }

    /// Appends `record` and applies it. Once the frame is on disk the
    /// transition has happened and the call succeeds.
    fn write(&self, journal: &mut Journal, record: &JournalRecord) -> StoreResult<()> {
        let frame = encode_frame(record)?;
        if let Err(e) = self.append_frame(journal, &frame) {
            if let Err(rollback) = journal.file.set_len(journal.len) {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "could not roll back failed journal append"
                );
            }
            return Err(e);
        }
        journal.len += frame.len() as u64;
        journal.tables.apply(record);
        journal.records += 1;
        self.maybe_compact(journal);
        Ok(())
    }

    fn append_frame(&self, journal: &mut Journal, frame: &[u8]) -> StoreResult<()> {
        let file_len = journal.file.metadata()?.len();
        if file_len != journal.len {
            warn!(
                path = %self.path.display(),
                expected = journal.len,
                file_len,
                "discarding partial journal frame"
            );
            journal.file.set_len(journal.len)?;
        }
        journal.file.write_all(frame)?;
        if self.config.sync_on_write {
            journal.file.sync_data()?;
        }
        Ok(())
    }

    fn maybe_compact(&self, journal: &mut Journal) {
        let live = journal.tables.live_rows() + 2;
        if journal.records <= live + self.config.compact_threshold {
            return;
        }
        if let Err(e) = self.compact_locked(journal) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "journal compaction failed; keeping the current journal"
            );
        }
    }

    fn compact_locked(&self, journal: &mut Journal) -> StoreResult<()> {
        let snapshot = journal.tables.snapshot();
        let temp_path = self.path.join(JOURNAL_TEMP);
        let journal_path = self.path.join(JOURNAL_FILE);

        let mut temp = File::create(&temp_path)?;
        let mut len = 0u64;
        for record in &snapshot {
            let frame = encode_frame(record)?;
            temp.write_all(&frame)?;
            len += frame.len() as u64;
        }
        temp.sync_all()?;
        drop(temp);

        // Opened before the rename so a failure leaves the old journal live.
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&temp_path)?;
        fs::rename(&temp_path, &journal_path)?;

        info!(
            path = %journal_path.display(),
            before = journal.records,
            after = snapshot.len(),
            "compacted journal"
        );
        journal.file = file;
        journal.records = snapshot.len();
        journal.len = len;
        sync_directory(&self.path)
    }
}

impl SyncStore for FileStore {
    fn append_mutation(
        &self,
        entity_id: &str,
        operation: Operation,
        payload: Fields,
        requested_at: DateTime<Utc>,
    ) -> StoreResult<QueuedMutation> {
        let mut journal = self.journal.lock();
        let m = journal
            .tables
            .plan_append(entity_id, operation, payload, requested_at);
        self.write(&mut journal, &JournalRecord::Append(m.clone()))?;
        Ok(m)
    }

    fn mutations(&self) -> StoreResult<Vec<QueuedMutation>> {
        Ok(self.journal.lock().tables.mutations())
    }

    fn get_mutation(&self, id: u64) -> StoreResult<Option<QueuedMutation>> {
        Ok(self.journal.lock().tables.get_mutation(id))
    }

    fn record_failure(
        &self,
        id: u64,
        retry_count: u32,
        error_message: &str,
    ) -> StoreResult<bool> {
        let mut journal = self.journal.lock();
        match journal.tables.plan_failure(id, retry_count, error_message) {
            Some(record) => {
                self.write(&mut journal, &record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_mutation(&self, id: u64) -> StoreResult<bool> {
        let mut journal = self.journal.lock();
        match journal.tables.plan_remove(id) {
            Some(record) => {
                self.write(&mut journal, &record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn move_to_dead_letter(
        &self,
        id: u64,
        retry_count: u32,
        error_message: &str,
        failed_at: DateTime<Utc>,
    ) -> StoreResult<Option<DeadLetterEntry>> {
        let mut journal = self.journal.lock();
        let entry = journal
            .tables
            .plan_dead_letter(id, retry_count, error_message, failed_at);
        if let Some(entry) = &entry {
            self.write(&mut journal, &JournalRecord::DeadLetter(entry.clone()))?;
        }
        Ok(entry)
    }

    fn dead_letters(&self) -> StoreResult<Vec<DeadLetterEntry>> {
        Ok(self.journal.lock().tables.dead_letters())
    }

    fn remove_dead_letter(&self, id: u64) -> StoreResult<bool> {
        let mut journal = self.journal.lock();
        match journal.tables.plan_remove_dead_letter(id) {
            Some(record) => {
                self.write(&mut journal, &record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn replay_dead_letter(
        &self,
        id: u64,
        requested_at: DateTime<Utc>,
    ) -> StoreResult<Option<QueuedMutation>> {
        let mut journal = self.journal.lock();
        let m = journal.tables.plan_replay(id, requested_at);
        if let Some(m) = &m {
            let record = JournalRecord::Replay {
                dead_letter_id: id,
                mutation: m.clone(),
            };
            self.write(&mut journal, &record)?;
        }
        Ok(m)
    }

    fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.journal.lock().tables.pending_count())
    }

    fn dead_letter_count(&self) -> StoreResult<usize> {
        Ok(self.journal.lock().tables.dead_letter_count())
    }

    fn last_sync_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.journal.lock().tables.last_sync_at())
    }

    fn set_last_sync_at(&self, at: DateTime<Utc>) -> StoreResult<()> {
        let mut journal = self.journal.lock();
        self.write(&mut journal, &JournalRecord::LastSync { at })
    }
}

fn encode_frame(record: &JournalRecord) -> StoreResult<Vec<u8>> {
    let payload = encode_cbor(record).map_err(|e| StoreError::Codec(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Codec(format!("record too large: {} bytes", payload.len())))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&fnv1a64(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Replays journal bytes. Returns the tables, the number of valid frames,
/// and the byte length of the valid prefix.
fn replay(bytes: &[u8]) -> (Tables, usize, usize) {
    let mut tables = Tables::new();
    let mut records = 0;
    let mut offset = 0;

    while offset + HEADER_LEN <= bytes.len() {
        let header = &bytes[offset..offset + HEADER_LEN];
        if header[0..4] != FRAME_MAGIC {
            break;
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[4..8]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mut hash_bytes = [0u8; 8];
        hash_bytes.copy_from_slice(&header[8..16]);
        let expected_hash = u64::from_le_bytes(hash_bytes);

        let start = offset + HEADER_LEN;
        let Some(end) = start.checked_add(len).filter(|end| *end <= bytes.len()) else {
            break;
        };
        let payload = &bytes[start..end];
        if fnv1a64(payload) != expected_hash {
            break;
        }

        match decode_cbor::<JournalRecord>(payload) {
            Ok(record) => tables.apply(&record),
            Err(_) => break,
        }

        records += 1;
        offset = end;
    }

    (tables, records, offset)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> StoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> StoreResult<()> {
    Ok(())
}
