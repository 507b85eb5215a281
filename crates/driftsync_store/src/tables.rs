//! In-memory table state and the journal records that change it.
//!
//! Both stores keep their tables in a [`Tables`] value. The file store
//! additionally writes each [`JournalRecord`] to disk before applying it,
//! and rebuilds the tables on open by replaying the journal.

use chrono::{DateTime, Utc};
use driftsync_protocol::{DeadLetterEntry, Fields, Operation, QueuedMutation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One state transition of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum JournalRecord {
    /// Id counters, written at the head of a compacted journal.
    Counters {
        next_mutation_id: u64,
        next_dead_letter_id: u64,
        last_created_at: Option<DateTime<Utc>>,
    },
    /// A mutation entered the queue (or was restored by compaction).
    Append(QueuedMutation),
    /// A dispatch attempt failed.
    Failure {
        id: u64,
        retry_count: u32,
        error_message: String,
    },
    /// A mutation left the queue.
    Remove { id: u64 },
    /// A mutation moved to the dead-letter table.
    DeadLetter(DeadLetterEntry),
    /// An operator purged a dead-letter entry.
    RemoveDeadLetter { id: u64 },
    /// A dead-letter entry went back into the queue as `mutation`.
    Replay {
        dead_letter_id: u64,
        mutation: QueuedMutation,
    },
    /// A sync pass completed.
    LastSync { at: DateTime<Utc> },
}

/// Queue, dead-letter table and metadata.
#[derive(Debug, Clone)]
pub(crate) struct Tables {
    next_mutation_id: u64,
    next_dead_letter_id: u64,
    last_created_at: Option<DateTime<Utc>>,
    mutations: BTreeMap<u64, QueuedMutation>,
    dead_letters: BTreeMap<u64, DeadLetterEntry>,
    last_sync_at: Option<DateTime<Utc>>,
}

impl Tables {
    pub(crate) fn new() -> Self {
        Self {
            next_mutation_id: 1,
            next_dead_letter_id: 1,
            last_created_at: None,
            mutations: BTreeMap::new(),
            dead_letters: BTreeMap::new(),
            last_sync_at: None,
        }
    }

    /// Builds the row for an append without applying it.
    pub(crate) fn plan_append(
        &self,
        entity_id: &str,
        operation: Operation,
        payload: Fields,
        requested_at: DateTime<Utc>,
    ) -> QueuedMutation {
        let created_at = match self.last_created_at {
            Some(last) if last > requested_at => last,
            _ => requested_at,
        };
        QueuedMutation::new(
            self.next_mutation_id,
            entity_id,
            operation,
            payload,
            created_at,
        )
    }

    /// Builds the record for a failure update, if the mutation exists.
    pub(crate) fn plan_failure(
        &self,
        id: u64,
        retry_count: u32,
        error_message: &str,
    ) -> Option<JournalRecord> {
        self.mutations.contains_key(&id).then(|| JournalRecord::Failure {
            id,
            retry_count,
            error_message: error_message.to_string(),
        })
    }

    /// Builds the record for a removal, if the mutation exists.
    pub(crate) fn plan_remove(&self, id: u64) -> Option<JournalRecord> {
        self.mutations
            .contains_key(&id)
            .then_some(JournalRecord::Remove { id })
    }

    /// Builds the dead-letter row for an escalation, if the mutation exists.
    pub(crate) fn plan_dead_letter(
        &self,
        id: u64,
        retry_count: u32,
        error_message: &str,
        failed_at: DateTime<Utc>,
    ) -> Option<DeadLetterEntry> {
        self.mutations.get(&id).map(|m| {
            DeadLetterEntry::from_mutation(
                self.next_dead_letter_id,
                m,
                retry_count,
                error_message,
                failed_at,
            )
        })
    }

    /// Builds the record for a dead-letter purge, if the entry exists.
    pub(crate) fn plan_remove_dead_letter(&self, id: u64) -> Option<JournalRecord> {
        self.dead_letters
            .contains_key(&id)
            .then_some(JournalRecord::RemoveDeadLetter { id })
    }

    /// Builds the queue row a dead-letter replay would add, if the entry
    /// exists.
    pub(crate) fn plan_replay(
        &self,
        dead_letter_id: u64,
        requested_at: DateTime<Utc>,
    ) -> Option<QueuedMutation> {
        let entry = self.dead_letters.get(&dead_letter_id)?;
        Some(self.plan_append(
            &entry.entity_id,
            entry.operation,
            entry.payload.clone(),
            requested_at,
        ))
    }

    /// Applies a record. Replaying the same sequence of records always
    /// yields the same tables.
    pub(crate) fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::Counters {
                next_mutation_id,
                next_dead_letter_id,
                last_created_at,
            } => {
                self.next_mutation_id = self.next_mutation_id.max(*next_mutation_id);
                self.next_dead_letter_id = self.next_dead_letter_id.max(*next_dead_letter_id);
                self.last_created_at = self.last_created_at.max(*last_created_at);
            }
            JournalRecord::Append(m) => self.insert_mutation(m),
            JournalRecord::Failure {
                id,
                retry_count,
                error_message,
            } => {
                if let Some(m) = self.mutations.get_mut(id) {
                    m.retry_count = *retry_count;
                    m.error_message = Some(error_message.clone());
                }
            }
            JournalRecord::Remove { id } => {
                self.mutations.remove(id);
            }
            JournalRecord::DeadLetter(entry) => {
                self.mutations.remove(&entry.original_id);
                self.next_dead_letter_id = self.next_dead_letter_id.max(entry.id + 1);
                self.dead_letters.insert(entry.id, entry.clone());
            }
            JournalRecord::RemoveDeadLetter { id } => {
                self.dead_letters.remove(id);
            }
            JournalRecord::Replay {
                dead_letter_id,
                mutation,
            } => {
                self.dead_letters.remove(dead_letter_id);
                self.insert_mutation(mutation);
            }
            JournalRecord::LastSync { at } => {
                self.last_sync_at = Some(*at);
            }
        }
    }

    fn insert_mutation(&mut self, m: &QueuedMutation) {
        self.next_mutation_id = self.next_mutation_id.max(m.id + 1);
        self.last_created_at = self.last_created_at.max(Some(m.created_at));
        self.mutations.insert(m.id, m.clone());
    }

    /// Records that rebuild the current state from scratch.
    pub(crate) fn snapshot(&self) -> Vec<JournalRecord> {
        let mut records = Vec::with_capacity(self.live_rows() + 2);
        records.push(JournalRecord::Counters {
            next_mutation_id: self.next_mutation_id,
            next_dead_letter_id: self.next_dead_letter_id,
            last_created_at: self.last_created_at,
        });
        records.extend(self.mutations.values().cloned().map(JournalRecord::Append));
        records.extend(
            self.dead_letters
                .values()
                .cloned()
                .map(JournalRecord::DeadLetter),
        );
        if let Some(at) = self.last_sync_at {
            records.push(JournalRecord::LastSync { at });
        }
        records
    }

    /// Rows a snapshot would hold.
    pub(crate) fn live_rows(&self) -> usize {
        self.mutations.len() + self.dead_letters.len()
    }

    pub(crate) fn mutations(&self) -> Vec<QueuedMutation> {
        self.mutations.values().cloned().collect()
    }

    pub(crate) fn get_mutation(&self, id: u64) -> Option<QueuedMutation> {
        self.mutations.get(&id).cloned()
    }

    pub(crate) fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters.values().cloned().collect()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.mutations.len()
    }

    pub(crate) fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }

    pub(crate) fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_sync_at
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}
