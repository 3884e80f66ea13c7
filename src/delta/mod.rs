//! Block matching: which target blocks already exist in the local file

pub mod coalesce;
pub mod index;
pub mod scan;

pub use coalesce::{DataRange, RangeBatch, RangeCoalescer};
pub use index::BlockHashIndex;
pub use scan::{LocalScanner, ScanStats, DEFAULT_CHUNK_SIZE};

use crate::error::{Error, Result};

/// Where a target block's bytes will come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSlot {
    /// Present in the local file starting at this byte offset
    Found(u64),
    /// Must be fetched
    Missing,
}

impl BlockSlot {
    /// Check if this block was matched locally
    pub fn is_found(&self) -> bool {
        matches!(self, BlockSlot::Found(_))
    }

    /// Check if this block must be fetched
    pub fn is_missing(&self) -> bool {
        matches!(self, BlockSlot::Missing)
    }
}

/// Per-target-block record of local availability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMap {
    slots: Vec<BlockSlot>,
}

impl BlockMap {
    /// Create a map with every block missing
    pub fn new(block_count: usize) -> Self {
        Self {
            slots: vec![BlockSlot::Missing; block_count],
        }
    }

    /// Number of target blocks
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the target has no blocks
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot for block `index`
    pub fn get(&self, index: usize) -> Option<BlockSlot> {
        self.slots.get(index).copied()
    }

    /// All slots, in target order
    pub fn slots(&self) -> &[BlockSlot] {
        &self.slots
    }

    /// Record that block `index` lives at `offset` in the local file
    pub fn set_found(&mut self, index: usize, offset: u64) -> Result<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            Error::recipe(format!("block index {} out of range ({} blocks)", index, len))
        })?;
        *slot = BlockSlot::Found(offset);
        Ok(())
    }

    /// Number of blocks matched locally
    pub fn found_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_found()).count()
    }

    /// Number of blocks to fetch
    pub fn missing_count(&self) -> usize {
        self.slots.len() - self.found_count()
    }

    /// Share of blocks matched locally, as a percentage
    pub fn percent_complete(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        (self.found_count() as f64 / self.slots.len() as f64) * 100.0
    }

    /// Discard matches with no matched neighbour.
    ///
    /// A lone match among missing blocks is more likely a checksum collision
    /// than real shared content. The first and last block only have one
    /// neighbour to check. Decisions use the map as it was before this pass.
    /// Returns how many matches were dropped.
    pub fn drop_isolated(&mut self) -> usize {
        let n = self.slots.len();
        if n < 2 {
            return 0;
        }

        let found: Vec<bool> = self.slots.iter().map(BlockSlot::is_found).collect();
        let mut dropped = 0;

        for i in 0..n {
            if !found[i] {
                continue;
            }
            let prev_missing = i == 0 || !found[i - 1];
            let next_missing = i == n - 1 || !found[i + 1];
            let isolated = match (i == 0, i == n - 1) {
                (true, _) => next_missing,
                (_, true) => prev_missing,
                _ => prev_missing && next_missing,
            };
            if isolated {
                self.slots[i] = BlockSlot::Missing;
                dropped += 1;
            }
        }

        if dropped > 0 {
            tracing::debug!(dropped, "Dropped isolated block matches");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_from(pattern: &str) -> BlockMap {
        let mut map = BlockMap::new(pattern.len());
        for (i, c) in pattern.chars().enumerate() {
            if c == 'F' {
                map.set_found(i, (i * 100) as u64).unwrap();
            }
        }
        map
    }

    fn pattern(map: &BlockMap) -> String {
        map.slots()
            .iter()
            .map(|s| if s.is_found() { 'F' } else { '.' })
            .collect()
    }

    #[test]
    fn test_new_map_is_all_missing() {
        let map = BlockMap::new(5);
        assert_eq!(map.missing_count(), 5);
        assert_eq!(map.percent_complete(), 0.0);
    }

    #[test]
    fn test_set_found_out_of_range() {
        let mut map = BlockMap::new(2);
        assert!(map.set_found(2, 0).is_err());
    }

    #[test]
    fn test_drop_isolated_middle() {
        let mut map = map_from(".F.");
        assert_eq!(map.drop_isolated(), 1);
        assert_eq!(pattern(&map), "...");
        assert_eq!(map.percent_complete(), 0.0);
    }

    #[test]
    fn test_drop_isolated_keeps_runs() {
        let mut map = map_from("FF.F.FFF");
        assert_eq!(map.drop_isolated(), 1);
        assert_eq!(pattern(&map), "FF...FFF");
    }

    #[test]
    fn test_drop_isolated_edges() {
        let mut map = map_from("F..F");
        assert_eq!(map.drop_isolated(), 2);
        assert_eq!(pattern(&map), "....");

        let mut map = map_from("FF.FF");
        assert_eq!(map.drop_isolated(), 0);
    }

    #[test]
    fn test_drop_isolated_single_block_untouched() {
        let mut map = map_from("F");
        assert_eq!(map.drop_isolated(), 0);
        assert_eq!(map.percent_complete(), 100.0);
    }

    #[test]
    fn test_percent_complete() {
        let map = map_from("FF.F");
        assert!((map.percent_complete() - 75.0).abs() < f64::EPSILON);
    }
}
