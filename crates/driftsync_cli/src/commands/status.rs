//! Status command implementation.

use super::CommandResult;
use crate::data::DataDir;
use chrono::{DateTime, Utc};
use driftsync_protocol::{EntityRecord, SyncStatus};
use driftsync_store::SyncStore;
use serde::Serialize;
use std::path::Path;

/// Local sync status.
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    /// Data directory.
    pub path: String,
    /// Queued mutations.
    pub pending: usize,
    /// Dead-letter entries.
    pub dead_letters: usize,
    /// End of the last pass that reached the remote authority.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Local entities by sync status.
    pub entities: EntityCounts,
}

/// Entity counts per sync status.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct EntityCounts {
    /// Awaiting confirmation.
    pub pending: usize,
    /// Confirmed.
    pub synced: usize,
    /// Failed, still retrying.
    pub error: usize,
    /// Dead-lettered.
    pub failed: usize,
}

impl EntityCounts {
    /// Tallies `records` by status.
    pub fn tally(records: &[EntityRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.sync_status {
                SyncStatus::Pending => counts.pending += 1,
                SyncStatus::Synced => counts.synced += 1,
                SyncStatus::Error => counts.error += 1,
                SyncStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Shows queue, dead-letter and entity status.
pub fn run(path: &Path, format: &str) -> CommandResult {
    let data = DataDir::open(path)?;
    let store = data.store()?;
    let entities = data.load_entities()?;

    let output = StatusOutput {
        path: path.display().to_string(),
        pending: store.pending_count()?,
        dead_letters: store.dead_letter_count()?,
        last_sync_at: store.last_sync_at()?,
        entities: EntityCounts::tally(&entities.records()),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&output)?),
        _ => print_text(&output),
    }
    Ok(())
}

fn print_text(output: &StatusOutput) {
    println!("driftsync status");
    println!("================");
    println!("Data:          {}", output.path);
    println!("Pending:       {}", output.pending);
    println!("Dead letters:  {}", output.dead_letters);
    match output.last_sync_at {
        Some(at) => println!("Last sync:     {}", at.to_rfc3339()),
        None => println!("Last sync:     never"),
    }
    println!();
    println!("Entities");
    println!("  pending:     {}", output.entities.pending);
    println!("  synced:      {}", output.entities.synced);
    println!("  error:       {}", output.entities.error);
    println!("  failed:      {}", output.entities.failed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::Fields;

    #[test]
    fn tally_counts_each_status() {
        let mut records: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|id| EntityRecord::new(*id, Fields::new(), Utc::now()))
            .collect();
        records[1].sync_status = SyncStatus::Synced;
        records[2].sync_status = SyncStatus::Failed;

        assert_eq!(
            EntityCounts::tally(&records),
            EntityCounts {
                pending: 1,
                synced: 1,
                error: 0,
                failed: 1,
            }
        );
    }
}
