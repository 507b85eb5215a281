//! Canonical entity state held by the reference server.

use chrono::{DateTime, Utc};
use driftsync_protocol::{Fields, ItemOutcome, Operation, QueuedMutation, RemoteState};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredEntity {
    remote_id: String,
    fields: Fields,
    updated_at: DateTime<Utc>,
    deleted: bool,
}

impl StoredEntity {
    fn to_remote_state(&self) -> RemoteState {
        RemoteState::new(
            Some(self.remote_id.clone()),
            self.fields.clone(),
            self.updated_at,
        )
    }
}

struct Inner {
    entities: BTreeMap<String, StoredEntity>,
    next_id: u64,
    /// Successful outcomes, keyed by (client id, mutation id).
    applied: HashMap<(String, u64), ItemOutcome>,
}

/// The remote authority's canonical view of every entity.
///
/// Writes are ordered by the mutation's `created_at`: a mutation older than
/// the stored version is answered with a conflict carrying the stored
/// state. Deleted entities are kept as tombstones so late writes still
/// conflict.
///
/// Re-submitting a mutation the authority already applied returns the
/// same outcome without applying it again. Rejected mutations are
/// evaluated afresh on every submission.
pub struct Authority {
    id_prefix: String,
    inner: RwLock<Inner>,
}

impl Authority {
    /// Creates an empty authority.
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            inner: RwLock::new(Inner {
                entities: BTreeMap::new(),
                next_id: 1,
                applied: HashMap::new(),
            }),
        }
    }

    /// Writes an entity directly, as another client would.
    ///
    /// Returns the entity's remote identifier.
    pub fn seed(&self, entity_id: &str, fields: Fields, updated_at: DateTime<Utc>) -> String {
        let mut inner = self.inner.write();
        let remote_id = match inner.entities.get(entity_id) {
            Some(existing) => existing.remote_id.clone(),
            None => self.assign_id(&mut inner),
        };
        inner.entities.insert(
            entity_id.to_string(),
            StoredEntity {
                remote_id: remote_id.clone(),
                fields,
                updated_at,
                deleted: false,
            },
        );
        remote_id
    }

    /// Current state of a live entity.
    pub fn get(&self, entity_id: &str) -> Option<RemoteState> {
        self.inner
            .read()
            .entities
            .get(entity_id)
            .filter(|e| !e.deleted)
            .map(StoredEntity::to_remote_state)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .entities
            .values()
            .filter(|e| !e.deleted)
            .count()
    }

    /// Returns true if no live entity exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct mutations applied.
    pub fn applied_count(&self) -> usize {
        self.inner.read().applied.len()
    }

    /// Applies one mutation and returns its outcome.
    pub fn apply(&self, client_id: &str, m: &QueuedMutation) -> ItemOutcome {
        let mut inner = self.inner.write();
        let key = (client_id.to_string(), m.id);
        if let Some(previous) = inner.applied.get(&key) {
            debug!(client_id, mutation_id = m.id, "duplicate mutation; replaying outcome");
            return previous.clone();
        }

        let outcome = self.apply_new(&mut inner, m);
        debug!(
            client_id,
            mutation_id = m.id,
            entity_id = %m.entity_id,
            operation = %m.operation,
            status = outcome.status(),
            "applied mutation"
        );
        if matches!(outcome, ItemOutcome::Success { .. }) {
            inner.applied.insert(key, outcome.clone());
        }
        outcome
    }

    fn apply_new(&self, inner: &mut Inner, m: &QueuedMutation) -> ItemOutcome {
        if let Some(stored) = inner.entities.get(&m.entity_id) {
            if stored.updated_at > m.created_at {
                return ItemOutcome::conflict(stored.to_remote_state());
            }
        }

        match m.operation {
            Operation::Create => {
                let remote_id = match inner.entities.get(&m.entity_id) {
                    Some(existing) => existing.remote_id.clone(),
                    None => self.assign_id(inner),
                };
                inner.entities.insert(
                    m.entity_id.clone(),
                    StoredEntity {
                        remote_id: remote_id.clone(),
                        fields: m.payload.clone(),
                        updated_at: m.created_at,
                        deleted: false,
                    },
                );
                ItemOutcome::success(remote_id)
            }
            Operation::Update => match inner.entities.get_mut(&m.entity_id) {
                Some(stored) if !stored.deleted => {
                    stored
                        .fields
                        .extend(m.payload.iter().map(|(k, v)| (k.clone(), v.clone())));
                    stored.updated_at = m.created_at;
                    ItemOutcome::success(stored.remote_id.clone())
                }
                _ => ItemOutcome::error(format!("entity {} does not exist", m.entity_id)),
            },
            Operation::Delete => match inner.entities.get_mut(&m.entity_id) {
                Some(stored) => {
                    stored.deleted = true;
                    stored.updated_at = m.created_at;
                    ItemOutcome::success(stored.remote_id.clone())
                }
                None => ItemOutcome::success(m.entity_id.clone()),
            },
        }
    }

    fn assign_id(&self, inner: &mut Inner) -> String {
        let id = format!("{}{}", self.id_prefix, inner.next_id);
        inner.next_id += 1;
        id
    }
}

impl Default for Authority {
    fn default() -> Self {
        Self::new("srv-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn fields(title: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("title".into(), json!(title));
        fields
    }

    fn mutation(id: u64, entity: &str, op: Operation, at: DateTime<Utc>) -> QueuedMutation {
        QueuedMutation::new(id, entity, op, fields(entity), at)
    }

    #[test]
    fn create_assigns_remote_ids() {
        let authority = Authority::default();
        let now = Utc::now();
        assert_eq!(
            authority.apply("c", &mutation(1, "a", Operation::Create, now)),
            ItemOutcome::success("srv-1")
        );
        assert_eq!(
            authority.apply("c", &mutation(2, "b", Operation::Create, now)),
            ItemOutcome::success("srv-2")
        );
        assert_eq!(authority.len(), 2);
    }

    #[test]
    fn stale_write_conflicts() {
        let authority = Authority::default();
        let now = Utc::now();
        authority.seed("a", fields("remote"), now);

        let outcome = authority.apply(
            "c",
            &mutation(1, "a", Operation::Update, now - Duration::seconds(5)),
        );
        match outcome {
            ItemOutcome::Conflict { remote } => {
                assert_eq!(remote.fields, fields("remote"));
                assert_eq!(remote.updated_at, now);
                assert_eq!(remote.remote_id.as_deref(), Some("srv-1"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn update_missing_entity_is_error() {
        let authority = Authority::default();
        let m = mutation(1, "ghost", Operation::Update, Utc::now());
        assert_eq!(authority.apply("c", &m).status(), "error");
        assert_eq!(authority.applied_count(), 0);

        authority.seed("ghost", Fields::new(), m.created_at);
        assert_eq!(authority.apply("c", &m), ItemOutcome::success("srv-1"));
    }

    #[test]
    fn delete_is_idempotent() {
        let authority = Authority::default();
        let now = Utc::now();
        authority.apply("c", &mutation(1, "a", Operation::Create, now));
        let outcome = authority.apply(
            "c",
            &mutation(2, "a", Operation::Delete, now + Duration::seconds(1)),
        );
        assert_eq!(outcome, ItemOutcome::success("srv-1"));
        assert!(authority.get("a").is_none());
        assert!(authority.is_empty());

        let outcome = authority.apply("c", &mutation(3, "never", Operation::Delete, now));
        assert_eq!(outcome.status(), "success");
    }

    #[test]
    fn duplicate_submission_replays_outcome() {
        let authority = Authority::default();
        let m = mutation(1, "a", Operation::Create, Utc::now());
        let first = authority.apply("c", &m);
        let second = authority.apply("c", &m);
        assert_eq!(first, second);
        assert_eq!(authority.applied_count(), 1);

        let other_client = authority.apply("d", &m);
        assert_eq!(other_client, ItemOutcome::success("srv-1"));
        assert_eq!(authority.applied_count(), 2);
    }
}
