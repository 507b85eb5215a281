//! The entity service collaborator.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use driftsync_protocol::{EntityRecord, Fields, Operation, SyncStatus};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Callbacks into the service that owns entities.
///
/// The engine reads and writes only sync-state through this trait. Errors
/// are reported in the pass result and never abort a pass.
pub trait EntityService: Send + Sync {
    /// Returns the current local record.
    fn get_entity(&self, entity_id: &str) -> SyncResult<Option<EntityRecord>>;

    /// Replaces the local record with a resolved version.
    fn apply_resolved_state(&self, entity_id: &str, resolved: &EntityRecord) -> SyncResult<()>;

    /// Marks the entity synced, recording the remote identifier if given.
    fn mark_synced(&self, entity_id: &str, remote_id: Option<&str>) -> SyncResult<()>;

    /// Marks the entity as having a failed attempt that will be retried.
    fn mark_sync_error(&self, entity_id: &str) -> SyncResult<()>;

    /// Marks the entity as permanently failed.
    fn mark_sync_failed(&self, entity_id: &str) -> SyncResult<()>;
}

/// An in-memory entity service.
///
/// Status updates for unknown entities are ignored, so mutations for
/// entities deleted locally reconcile cleanly.
#[derive(Debug, Default)]
pub struct MemoryEntityService {
    entities: RwLock<BTreeMap<String, EntityRecord>>,
}

impl MemoryEntityService {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service holding `records`.
    pub fn from_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        Self {
            entities: RwLock::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }

    /// Inserts or replaces a record.
    pub fn upsert(&self, record: EntityRecord) {
        self.entities.write().insert(record.id.clone(), record);
    }

    /// Returns a record.
    pub fn get(&self, entity_id: &str) -> Option<EntityRecord> {
        self.entities.read().get(entity_id).cloned()
    }

    /// Every record, ordered by id.
    pub fn records(&self) -> Vec<EntityRecord> {
        self.entities.read().values().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Applies a local mutation: create inserts, update merges fields,
    /// delete removes. The record becomes `pending`.
    pub fn apply_local(
        &self,
        entity_id: &str,
        operation: Operation,
        payload: &Fields,
        at: DateTime<Utc>,
    ) {
        let mut entities = self.entities.write();
        match operation {
            Operation::Delete => {
                entities.remove(entity_id);
            }
            Operation::Create | Operation::Update => {
                let record = entities
                    .entry(entity_id.to_string())
                    .or_insert_with(|| EntityRecord::new(entity_id, Fields::new(), at));
                if operation == Operation::Create {
                    record.fields = payload.clone();
                } else {
                    record
                        .fields
                        .extend(payload.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                record.updated_at = at;
                record.sync_status = SyncStatus::Pending;
            }
        }
    }

    fn set_status(&self, entity_id: &str, status: SyncStatus) {
        if let Some(record) = self.entities.write().get_mut(entity_id) {
            record.sync_status = status;
        }
    }
}

impl EntityService for MemoryEntityService {
    fn get_entity(&self, entity_id: &str) -> SyncResult<Option<EntityRecord>> {
        Ok(self.get(entity_id))
    }

    fn apply_resolved_state(&self, entity_id: &str, resolved: &EntityRecord) -> SyncResult<()> {
        let mut record = resolved.clone();
        record.id = entity_id.to_string();
        self.entities.write().insert(entity_id.to_string(), record);
        Ok(())
    }

    fn mark_synced(&self, entity_id: &str, remote_id: Option<&str>) -> SyncResult<()> {
        if let Some(record) = self.entities.write().get_mut(entity_id) {
            record.sync_status = SyncStatus::Synced;
            record.last_synced_at = Some(Utc::now());
            if let Some(remote_id) = remote_id {
                record.remote_id = Some(remote_id.to_string());
            }
        }
        Ok(())
    }

    fn mark_sync_error(&self, entity_id: &str) -> SyncResult<()> {
        self.set_status(entity_id, SyncStatus::Error);
        Ok(())
    }

    fn mark_sync_failed(&self, entity_id: &str) -> SyncResult<()> {
        self.set_status(entity_id, SyncStatus::Failed);
        Ok(())
    }
}
