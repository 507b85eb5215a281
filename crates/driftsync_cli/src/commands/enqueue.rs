//! Enqueue command implementation.

use super::CommandResult;
use crate::data::DataDir;
use driftsync_engine::MutationQueue;
use driftsync_protocol::{Fields, Operation};
use std::path::Path;
use std::sync::Arc;

/// Parses a JSON object into mutation fields. An absent payload is empty.
pub fn parse_payload(json: Option<&str>) -> Result<Fields, serde_json::Error> {
    match json {
        Some(json) => serde_json::from_str(json),
        None => Ok(Fields::new()),
    }
}

/// Records a local change and queues it for sync.
pub fn run(
    path: &Path,
    entity_id: &str,
    operation: &str,
    payload: Option<&str>,
) -> CommandResult {
    let operation: Operation = operation.parse()?;
    let payload = parse_payload(payload)?;

    let data = DataDir::open(path)?;
    let queue = MutationQueue::new(Arc::new(data.store()?));
    let entities = data.load_entities()?;

    let m = queue.enqueue(entity_id, operation, payload)?;
    entities.apply_local(entity_id, operation, &m.payload, m.created_at);
    data.save_entities(&entities)?;

    println!("✓ Queued mutation {} ({} {})", m.id, m.operation, m.entity_id);
    Ok(())
}
