//! Dead-letter inspection, purge and replay.

use super::CommandResult;
use crate::data::DataDir;
use driftsync_engine::DeadLetterStore;
use driftsync_protocol::DeadLetterEntry;
use driftsync_store::FileStore;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn open(path: &Path) -> Result<DeadLetterStore<FileStore>, Box<dyn std::error::Error>> {
    let data = DataDir::open(path)?;
    Ok(DeadLetterStore::new(Arc::new(data.store()?)))
}

/// Lists dead-letter entries, newest failures first.
pub fn list(path: &Path, format: &str) -> CommandResult {
    let entries = open(path)?.entries()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => print_text(&entries),
    }
    Ok(())
}

/// Deletes one entry, or every entry when `id` is `None`.
pub fn purge(path: &Path, id: Option<u64>) -> CommandResult {
    let store = open(path)?;
    let ids: Vec<u64> = match id {
        Some(id) => vec![id],
        None => store.entries()?.iter().map(|e| e.id).collect(),
    };

    let mut removed = 0;
    for id in ids {
        if store.remove(id)? {
            removed += 1;
        }
    }
    if let (Some(id), 0) = (id, removed) {
        return Err(format!("no dead-letter entry with id {id}").into());
    }

    info!(removed, "purged dead-letter entries");
    println!(
        "✓ Removed {removed} dead-letter entr{}",
        if removed == 1 { "y" } else { "ies" }
    );
    Ok(())
}

/// Moves an entry back into the queue as a fresh mutation.
pub fn replay(path: &Path, id: u64) -> CommandResult {
    let store = open(path)?;
    match store.replay(id)? {
        Some(m) => {
            println!(
                "✓ Replayed dead-letter entry {id} as mutation {} ({} {})",
                m.id, m.operation, m.entity_id
            );
            Ok(())
        }
        None => Err(format!("no dead-letter entry with id {id}").into()),
    }
}

fn print_text(entries: &[DeadLetterEntry]) {
    if entries.is_empty() {
        println!("No dead-letter entries");
        return;
    }

    for e in entries {
        println!(
            "#{} {} {} (mutation {}, {} attempts)",
            e.id, e.operation, e.entity_id, e.original_id, e.retry_count
        );
        println!("    failed at: {}", e.failed_at.to_rfc3339());
        println!("    error:     {}", e.error_message);
    }
    println!(
        "\n{} entr{}",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" }
    );
}
