//! Queue listing command.

use super::CommandResult;
use crate::data::DataDir;
use driftsync_protocol::QueuedMutation;
use driftsync_store::SyncStore;
use std::path::Path;

/// Lists queued mutations in insertion order.
pub fn run(path: &Path, format: &str) -> CommandResult {
    let data = DataDir::open(path)?;
    let mutations = data.store()?.mutations()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&mutations)?),
        _ => print_text(&mutations),
    }
    Ok(())
}

fn print_text(mutations: &[QueuedMutation]) {
    if mutations.is_empty() {
        println!("Queue is empty");
        return;
    }

    println!(
        "{:>6}  {:<24}  {:<6}  {:>7}  {:<25}  LAST ERROR",
        "ID", "ENTITY", "OP", "RETRIES", "CREATED"
    );
    for m in mutations {
        println!(
            "{:>6}  {:<24}  {:<6}  {:>7}  {:<25}  {}",
            m.id,
            m.entity_id,
            m.operation,
            m.retry_count,
            m.created_at.to_rfc3339(),
            m.error_message.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} mutation(s)", mutations.len());
}
