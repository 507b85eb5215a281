//! Batch transport checksum.
//!
//! The checksum lets the remote authority notice a truncated or reordered
//! batch. It is a 64-bit FNV-1a hash and carries no security guarantee.

use crate::mutation::QueuedMutation;

/// HTTP header carrying the batch checksum.
pub const CHECKSUM_HEADER: &str = "X-Batch-Checksum";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const FIELD_SEPARATOR: char = ':';
const ITEM_SEPARATOR: char = '|';

/// 64-bit FNV-1a hash.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Computes the checksum of an ordered batch.
///
/// Each item contributes `id:entity_id:operation:created_at_ms`; items are
/// joined with `|`. The result is 16 lowercase hex digits.
pub fn batch_checksum(mutations: &[QueuedMutation]) -> String {
    let mut canonical = String::with_capacity(mutations.len() * 48);
    for (i, m) in mutations.iter().enumerate() {
        if i > 0 {
            canonical.push(ITEM_SEPARATOR);
        }
        canonical.push_str(&m.id.to_string());
        canonical.push(FIELD_SEPARATOR);
        canonical.push_str(&m.entity_id);
        canonical.push(FIELD_SEPARATOR);
        canonical.push_str(m.operation.as_str());
        canonical.push(FIELD_SEPARATOR);
        canonical.push_str(&m.created_at.timestamp_millis().to_string());
    }
    format!("{:016x}", fnv1a64(canonical.as_bytes()))
}
