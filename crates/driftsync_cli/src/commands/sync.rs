//! Sync command implementation.

use super::{build_engine, CommandResult, RemoteOptions};
use crate::data::DataDir;
use driftsync_engine::SyncPassResult;
use serde::Serialize;
use std::path::Path;

/// Summary of one sync pass.
#[derive(Debug, Serialize)]
pub struct PassOutput {
    /// No mutation failed.
    pub success: bool,
    /// Mutations confirmed, conflicts included.
    pub synced: usize,
    /// Mutations that failed.
    pub failed: usize,
    /// Conflicts resolved.
    pub conflicts: usize,
    /// Mutations moved to the dead-letter store.
    pub dead_lettered: usize,
    /// Mutations skipped after an earlier failure on their entity.
    pub held_back: usize,
    /// Batches submitted.
    pub batches: usize,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Per-mutation and pass-level reports.
    pub errors: Vec<ErrorOutput>,
}

/// One reported error.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    /// Entity, or `global`.
    pub entity_id: String,
    /// Mutation, if the error concerns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation_id: Option<u64>,
    /// Error category.
    pub kind: String,
    /// Description.
    pub message: String,
}

impl From<&SyncPassResult> for PassOutput {
    fn from(result: &SyncPassResult) -> Self {
        Self {
            success: result.success,
            synced: result.synced_items,
            failed: result.failed_items,
            conflicts: result.conflicts_resolved,
            dead_lettered: result.dead_lettered,
            held_back: result.held_back_items,
            batches: result.batches_sent,
            duration_ms: result.duration.as_millis() as u64,
            errors: result
                .errors
                .iter()
                .map(|e| ErrorOutput {
                    entity_id: e.entity_id.clone(),
                    mutation_id: e.mutation_id,
                    kind: e.kind.to_string(),
                    message: e.message.clone(),
                })
                .collect(),
        }
    }
}

/// Prints a pass summary.
pub fn print_pass(result: &SyncPassResult, format: &str) -> Result<(), serde_json::Error> {
    if format == "json" {
        println!("{}", serde_json::to_string(&PassOutput::from(result))?);
        return Ok(());
    }

    let mark = if result.success { "✓" } else { "✗" };
    println!(
        "{mark} synced {} · failed {} · conflicts {} · dead-lettered {} · batches {} ({} ms)",
        result.synced_items,
        result.failed_items,
        result.conflicts_resolved,
        result.dead_lettered,
        result.batches_sent,
        result.duration.as_millis()
    );
    if result.held_back_items > 0 {
        println!("  {} held back until the next pass", result.held_back_items);
    }
    for error in &result.errors {
        println!("  {error}");
    }
    Ok(())
}

/// Runs one sync pass against the remote authority.
pub fn run(path: &Path, remote: &RemoteOptions, format: &str) -> CommandResult {
    let data = DataDir::open(path)?;
    let (engine, entities) = build_engine(&data, remote)?;

    let result = engine.run_sync_pass()?;
    data.save_entities(&entities)?;
    print_pass(&result, format)?;
    Ok(())
}
