//! Coalesce missing blocks into byte ranges for batched fetching
//!
//! Adjacent missing blocks are merged into one range. A batch covers at most
//! `max_ranges` blocks, which bounds both its range count and its size in
//! bytes; the caller fetches and applies a batch, then asks for the next one
//! starting at the returned block index.

use super::BlockMap;
use std::fmt;

/// Half-open byte range `[start, end)` of the target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataRange {
    pub start: u64,
    pub end: u64,
}

impl DataRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Length in bytes
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive last byte offset, as used in HTTP `Range` headers
    pub fn last(&self) -> u64 {
        self.end.saturating_sub(1)
    }

    /// `start-last` form used in a `Range: bytes=` header
    pub fn header_spec(&self) -> String {
        format!("{}-{}", self.start, self.last())
    }
}

impl fmt::Display for DataRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Ranges to fetch in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBatch {
    /// Ranges in ascending order
    pub ranges: Vec<DataRange>,
    /// Block index the next batch starts from
    pub next: usize,
}

impl RangeBatch {
    /// Check if there is nothing left to fetch
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total bytes requested by this batch
    pub fn total_bytes(&self) -> u64 {
        self.ranges.iter().map(DataRange::len).sum()
    }
}

/// Turns runs of missing blocks into bounded batches of byte ranges
#[derive(Debug, Clone, Copy)]
pub struct RangeCoalescer {
    block_size: u64,
    target_len: u64,
    max_ranges: usize,
}

impl RangeCoalescer {
    pub fn new(block_size: usize, target_len: u64, max_ranges: usize) -> Self {
        Self {
            block_size: block_size as u64,
            target_len,
            max_ranges: max_ranges.max(1),
        }
    }

    /// Byte range covering blocks `first..last_exclusive`, clamped to the target
    fn blocks_to_range(&self, first: usize, last_exclusive: usize) -> DataRange {
        let start = first as u64 * self.block_size;
        let end = (last_exclusive as u64 * self.block_size).min(self.target_len);
        DataRange::new(start, end)
    }

    /// Collect the next batch of missing blocks starting at block `from`.
    ///
    /// A batch covers at most `max_ranges` blocks, so it never holds more
    /// than `max_ranges * block_size` bytes. Adjacent missing blocks share a
    /// range; a run longer than what is left of the budget is split and
    /// continues in the next batch. The returned `next` is the block index
    /// the next batch starts from, or the block count when the map is
    /// exhausted.
    pub fn next_batch(&self, map: &BlockMap, from: usize) -> RangeBatch {
        let slots = map.slots();
        let mut ranges = Vec::new();
        let mut budget = self.max_ranges;
        let mut i = from;

        while i < slots.len() && budget > 0 {
            if !slots[i].is_missing() {
                i += 1;
                continue;
            }
            let run_start = i;
            while i < slots.len() && slots[i].is_missing() && budget > 0 {
                i += 1;
                budget -= 1;
            }
            ranges.push(self.blocks_to_range(run_start, i));
        }

        // Skip trailing found blocks so an exhausted map reports completion
        if budget == 0 {
            while i < slots.len() && !slots[i].is_missing() {
                i += 1;
            }
        }

        RangeBatch { ranges, next: i }
    }

    /// All batches needed to fetch every missing block
    pub fn batches<'m>(&self, map: &'m BlockMap) -> impl Iterator<Item = RangeBatch> + 'm {
        let coalescer = *self;
        let mut from = 0;
        std::iter::from_fn(move || {
            let batch = coalescer.next_batch(map, from);
            if batch.is_empty() {
                return None;
            }
            from = batch.next;
            Some(batch)
        })
    }
}
