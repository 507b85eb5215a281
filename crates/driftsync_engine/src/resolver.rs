//! Last-write-wins conflict resolution.
//!
//! Precedence, decided by `updated_at`:
//!
//! | Condition        | Field values | `remote_id`                        | `id`  |
//! |------------------|--------------|------------------------------------|-------|
//! | local is newer   | local        | remote's if present, else local's  | local |
//! | remote is newer  | remote       | remote's                           | local |
//! | equal            | local        | remote's if present, else local's  | local |
//!
//! The merged record is always `synced`, with `last_synced_at` and
//! `updated_at` set to the resolution instant.

use chrono::{DateTime, Utc};
use driftsync_protocol::{EntityRecord, RemoteState, SyncStatus};
use std::fmt;

/// Which version's field values won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The client's version.
    Local,
    /// The remote authority's version.
    Remote,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Local => f.write_str("local"),
            Winner::Remote => f.write_str("remote"),
        }
    }
}

/// Result of resolving one conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Which side won.
    pub winner: Winner,
    /// The merged entity.
    pub merged: EntityRecord,
}

/// Resolves conflicts between the local entity and the remote state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Creates a resolver.
    pub fn new() -> Self {
        Self
    }

    /// Resolves at the current time.
    pub fn resolve(&self, local: &EntityRecord, remote: &RemoteState) -> Resolution {
        self.resolve_at(local, remote, Utc::now())
    }

    /// Resolves with `now` as the resolution instant.
    pub fn resolve_at(
        &self,
        local: &EntityRecord,
        remote: &RemoteState,
        now: DateTime<Utc>,
    ) -> Resolution {
        let (winner, fields, remote_id) = if remote.updated_at > local.updated_at {
            (Winner::Remote, remote.fields.clone(), remote.remote_id.clone())
        } else {
            // Ties go to the local version.
            (
                Winner::Local,
                local.fields.clone(),
                remote
                    .remote_id
                    .clone()
                    .or_else(|| local.remote_id.clone()),
            )
        };

        Resolution {
            winner,
            merged: EntityRecord {
                id: local.id.clone(),
                remote_id,
                fields,
                sync_status: SyncStatus::Synced,
                updated_at: now,
                last_synced_at: Some(now),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use driftsync_protocol::Fields;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn fields(title: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("title".into(), json!(title));
        fields
    }

    fn local(updated_at: DateTime<Utc>) -> EntityRecord {
        let mut record = EntityRecord::new("task-1", fields("local"), updated_at);
        record.remote_id = Some("srv-old".into());
        record
    }

    fn remote(updated_at: DateTime<Utc>, remote_id: Option<&str>) -> RemoteState {
        RemoteState::new(remote_id.map(String::from), fields("remote"), updated_at)
    }

    #[test]
    fn newer_local_wins_and_adopts_remote_id() {
        let now = t0() + Duration::minutes(1);
        let resolution = ConflictResolver::new().resolve_at(
            &local(t0() + Duration::seconds(10)),
            &remote(t0(), Some("srv-9")),
            now,
        );

        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.merged.fields, fields("local"));
        assert_eq!(resolution.merged.remote_id.as_deref(), Some("srv-9"));
        assert_eq!(resolution.merged.id, "task-1");
        assert_eq!(resolution.merged.sync_status, SyncStatus::Synced);
        assert_eq!(resolution.merged.updated_at, now);
        assert_eq!(resolution.merged.last_synced_at, Some(now));
    }

    #[test]
    fn newer_local_keeps_own_remote_id_when_remote_has_none() {
        let resolution = ConflictResolver::new().resolve_at(
            &local(t0() + Duration::seconds(10)),
            &remote(t0(), None),
            t0(),
        );
        assert_eq!(resolution.merged.remote_id.as_deref(), Some("srv-old"));
    }

    #[test]
    fn newer_remote_wins_with_its_identity() {
        let resolution = ConflictResolver::new().resolve_at(
            &local(t0()),
            &remote(t0() + Duration::seconds(10), Some("srv-9")),
            t0() + Duration::minutes(1),
        );

        assert_eq!(resolution.winner, Winner::Remote);
        assert_eq!(resolution.merged.fields, fields("remote"));
        assert_eq!(resolution.merged.remote_id.as_deref(), Some("srv-9"));
        assert_eq!(resolution.merged.id, "task-1");
        assert_eq!(resolution.merged.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn equal_timestamps_favour_local() {
        let resolution = ConflictResolver::new().resolve_at(
            &local(t0()),
            &remote(t0(), Some("srv-9")),
            t0() + Duration::minutes(1),
        );
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.merged.fields, fields("local"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = ConflictResolver::new();
        let l = local(t0() + Duration::seconds(10));
        let r = remote(t0(), Some("srv-9"));
        let now = t0() + Duration::minutes(1);

        let first = resolver.resolve_at(&l, &r, now);
        for _ in 0..10 {
            assert_eq!(resolver.resolve_at(&l, &r, now), first);
        }
    }

    #[test]
    fn resolve_uses_fresh_timestamp() {
        let before = Utc::now();
        let resolution = ConflictResolver::new().resolve(&local(t0()), &remote(t0(), None));
        assert!(resolution.merged.updated_at >= before);
        assert_eq!(
            resolution.merged.last_synced_at,
            Some(resolution.merged.updated_at)
        );
    }
}
