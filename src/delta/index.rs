//! Weak-sum hash index over the target's block records
//!
//! Records are consumed on confirmation, so a target block can be claimed by at
//! most one local window no matter how often its content repeats locally.

use crate::recipe::ChecksumRecord;
use std::collections::HashMap;

/// Hash table from truncated weak sum to the records still unmatched
#[derive(Debug, Default)]
pub struct BlockHashIndex {
    buckets: HashMap<u32, Vec<ChecksumRecord>>,
    remaining: usize,
}

impl BlockHashIndex {
    /// Build the index from a recipe's block records
    pub fn new(records: impl IntoIterator<Item = ChecksumRecord>) -> Self {
        let mut buckets: HashMap<u32, Vec<ChecksumRecord>> = HashMap::new();
        let mut remaining = 0;
        for record in records {
            buckets.entry(record.weak_sum).or_default().push(record);
            remaining += 1;
        }
        Self { buckets, remaining }
    }

    /// True if some unmatched record has this weak sum. Does not consume.
    #[inline]
    pub fn probe(&self, weak_sum: u32) -> bool {
        self.buckets.contains_key(&weak_sum)
    }

    /// Find a record matching both sums and remove it from the index.
    ///
    /// Returns the owned record, or `None` if the candidate window did not
    /// match (an expected outcome, not an error).
    pub fn confirm(&mut self, weak_sum: u32, strong_sum: &[u8]) -> Option<ChecksumRecord> {
        let bucket = self.buckets.get_mut(&weak_sum)?;
        let position = bucket.iter().position(|r| r.strong_sum == strong_sum)?;

        // Keep lower sequence indices first so repeated content fills the
        // earliest target blocks
        let record = bucket.remove(position);
        if bucket.is_empty() {
            self.buckets.remove(&weak_sum);
        }
        self.remaining -= 1;
        Some(record)
    }

    /// Number of records not yet matched
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Check if every record has been matched
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Number of distinct weak sums still indexed
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
