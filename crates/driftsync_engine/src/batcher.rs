//! Batching of drained mutations.

use chrono::{DateTime, Utc};
use driftsync_protocol::{batch_checksum, BatchRequest, QueuedMutation};

/// An ephemeral group of mutations submitted together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Mutations in dispatch order.
    pub mutations: Vec<QueuedMutation>,
    /// Checksum over the ordered mutations.
    pub checksum: String,
}

impl Batch {
    /// Creates a batch and computes its checksum.
    pub fn new(mutations: Vec<QueuedMutation>) -> Self {
        let checksum = batch_checksum(&mutations);
        Self {
            mutations,
            checksum,
        }
    }

    /// Number of mutations.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns true if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Builds the wire request for this batch.
    pub fn to_request(&self, client_id: &str, client_timestamp: DateTime<Utc>) -> BatchRequest {
        BatchRequest {
            client_id: client_id.to_string(),
            client_timestamp,
            checksum: self.checksum.clone(),
            mutations: self.mutations.clone(),
        }
    }
}

/// Splits `mutations` into consecutive batches of at most `batch_size`.
///
/// Input order is preserved exactly; the last batch may be smaller. A
/// `batch_size` of 0 is treated as 1.
pub fn make_batches(mutations: Vec<QueuedMutation>, batch_size: usize) -> Vec<Batch> {
    let size = batch_size.max(1);
    let mut batches = Vec::with_capacity(mutations.len().div_ceil(size));
    let mut iter = mutations.into_iter().peekable();
    while iter.peek().is_some() {
        let chunk: Vec<_> = iter.by_ref().take(size).collect();
        batches.push(Batch::new(chunk));
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::{Fields, Operation};
    use proptest::prelude::*;

    fn mutations(n: usize) -> Vec<QueuedMutation> {
        let base = Utc::now();
        (0..n)
            .map(|i| {
                QueuedMutation::new(
                    i as u64 + 1,
                    format!("e{}", i % 3),
                    Operation::Update,
                    Fields::new(),
                    base,
                )
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(make_batches(Vec::new(), 50).is_empty());
    }

    #[test]
    fn last_batch_may_be_smaller() {
        let batches = make_batches(mutations(7), 3);
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn zero_batch_size_is_one() {
        assert_eq!(make_batches(mutations(3), 0).len(), 3);
    }

    #[test]
    fn request_carries_batch_checksum() {
        let batch = Batch::new(mutations(4));
        let request = batch.to_request("client-1", Utc::now());
        assert_eq!(request.checksum, batch.checksum);
        assert!(request.checksum_matches());
        assert_eq!(request.client_id, "client-1");
        assert_eq!(request.mutations, batch.mutations);
    }

    #[test]
    fn batch_does_not_regroup_by_entity() {
        let input = mutations(6);
        let batches = make_batches(input.clone(), 4);
        let ids: Vec<_> = batches[0].mutations.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    proptest! {
        #[test]
        fn batches_concatenate_to_input(n in 0usize..200, size in 1usize..60) {
            let input = mutations(n);
            let batches = make_batches(input.clone(), size);

            prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));
            if let Some((last, full)) = batches.split_last() {
                prop_assert!(full.iter().all(|b| b.len() == size));
                prop_assert!(last.len() <= size);
            }

            let flattened: Vec<_> = batches.into_iter().flat_map(|b| b.mutations).collect();
            prop_assert_eq!(flattened, input);
        }
    }
}
