//! Rebuild the target byte stream from local blocks and fetched ranges
//!
//! Blocks are written strictly in target order. Missing blocks consume the
//! fetched payloads in the order their ranges were requested; a payload that
//! does not line up with the block being written fails the reconstruction.

use crate::cancel::CancelFlag;
use crate::delta::{BlockMap, BlockSlot, DataRange, RangeCoalescer};
use crate::error::{Error, Phase, Result};
use crate::local::SeedFile;
use crate::progress::{ProgressSink, NO_PROGRESS};
use crate::recipe::Recipe;
use crate::source::{FetchedRange, RangeSource};
use bytes::Bytes;
use std::collections::VecDeque;
use std::io::Write;

/// Byte counts from one reconstruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructStats {
    /// Bytes copied from the seed file
    pub bytes_local: u64,
    /// Bytes taken from fetched ranges
    pub bytes_fetched: u64,
    /// Range batches requested
    pub batches: usize,
}

/// Check that a source answered a batch with exactly the requested ranges,
/// in request order, each with the right amount of data.
pub fn check_batch(requested: &[DataRange], fetched: &[FetchedRange]) -> Result<()> {
    if requested.len() != fetched.len() {
        return Err(Error::malformed(format!(
            "requested {} ranges, received {}",
            requested.len(),
            fetched.len()
        )));
    }

    for (want, got) in requested.iter().zip(fetched) {
        if *want != got.range {
            return Err(Error::RangeOrder {
                expected: want.to_string(),
                actual: got.range.to_string(),
            });
        }
        if got.data.len() as u64 != want.len() {
            return Err(Error::malformed(format!(
                "range {} carried {} bytes",
                want,
                got.data.len()
            )));
        }
    }
    Ok(())
}

/// Ordered stream of fetched bytes for the missing blocks
struct FetchStream<'a> {
    source: &'a mut dyn RangeSource,
    map: &'a BlockMap,
    coalescer: RangeCoalescer,
    /// Block index the next batch is coalesced from
    next_block: usize,
    pending: VecDeque<FetchedRange>,
    current: Option<FetchedRange>,
    /// Absolute target offset of the next unconsumed byte in `current`
    cursor: u64,
    batches: usize,
}

impl<'a> FetchStream<'a> {
    fn new(source: &'a mut dyn RangeSource, map: &'a BlockMap, coalescer: RangeCoalescer) -> Self {
        Self {
            source,
            map,
            coalescer,
            next_block: 0,
            pending: VecDeque::new(),
            current: None,
            cursor: 0,
            batches: 0,
        }
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let batch = self.coalescer.next_batch(self.map, self.next_block);
        if batch.is_empty() {
            return Err(Error::malformed("no ranges left to fetch for a missing block"));
        }

        tracing::debug!(
            ranges = batch.ranges.len(),
            bytes = batch.total_bytes(),
            from_block = self.next_block,
            "Fetching range batch"
        );

        let fetched = self
            .source
            .fetch_ranges(&batch.ranges)
            .map_err(|e| e.in_phase(Phase::Fetch))?;
        check_batch(&batch.ranges, &fetched).map_err(|e| e.in_phase(Phase::Fetch))?;

        self.pending.extend(fetched);
        self.next_block = batch.next;
        self.batches += 1;
        Ok(())
    }

    /// Take the bytes of `expected`, which must be the next unconsumed
    /// stretch of fetched data
    fn take(&mut self, expected: DataRange) -> Result<Bytes> {
        let exhausted = self
            .current
            .as_ref()
            .map_or(true, |current| self.cursor >= current.range.end);

        if exhausted {
            if self.pending.is_empty() {
                self.fetch_batch()?;
            }
            let next = self
                .pending
                .pop_front()
                .ok_or_else(|| Error::malformed("fetched batch was empty"))?;
            self.cursor = next.range.start;
            self.current = Some(next);
        }

        let current = self
            .current
            .as_ref()
            .ok_or_else(|| Error::malformed("no fetched data available"))?;

        if self.cursor != expected.start || expected.end > current.range.end {
            return Err(Error::RangeOrder {
                expected: expected.to_string(),
                actual: DataRange::new(self.cursor, current.range.end).to_string(),
            }
            .in_phase(Phase::Reconstruct));
        }

        let offset = (self.cursor - current.range.start) as usize;
        let data = current.data.slice(offset..offset + expected.len() as usize);
        self.cursor = expected.end;
        Ok(data)
    }
}

/// Writes the target file from a block map
pub struct Reconstructor<'a> {
    recipe: &'a Recipe,
    map: &'a BlockMap,
    seed: Option<&'a SeedFile>,
    max_ranges: usize,
    progress: &'a dyn ProgressSink,
    cancel: CancelFlag,
}

impl<'a> Reconstructor<'a> {
    pub fn new(recipe: &'a Recipe, map: &'a BlockMap, seed: Option<&'a SeedFile>) -> Self {
        Self {
            recipe,
            map,
            seed,
            max_ranges: recipe.max_ranges_per_request,
            progress: &NO_PROGRESS,
            cancel: CancelFlag::new(),
        }
    }

    /// Override the recipe's maximum ranges per request
    pub fn max_ranges(mut self, max_ranges: usize) -> Self {
        self.max_ranges = max_ranges;
        self
    }

    pub fn progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Write every target block, in order, to `out`
    pub fn write_to<W: Write>(
        &self,
        source: &mut dyn RangeSource,
        out: &mut W,
    ) -> Result<ReconstructStats> {
        let block_count = self.recipe.block_count();
        if self.map.len() != block_count {
            return Err(Error::recipe(format!(
                "block map has {} entries for {} blocks",
                self.map.len(),
                block_count
            )));
        }

        let coalescer = RangeCoalescer::new(
            self.recipe.block_size,
            self.recipe.length,
            self.max_ranges,
        );
        let mut fetched = FetchStream::new(source, self.map, coalescer);
        let mut stats = ReconstructStats::default();
        let mut block = vec![0u8; self.recipe.block_size];
        let mut written = 0u64;

        self.progress.start("reconstruct", self.recipe.length);

        for (index, slot) in self.map.slots().iter().enumerate() {
            self.cancel.check()?;
            let len = self.recipe.block_len(index);
            let start = self.recipe.block_offset(index);

            match *slot {
                BlockSlot::Found(offset) => {
                    let seed = self.seed.ok_or_else(|| {
                        Error::recipe(format!("block {} matched without a seed file", index))
                            .in_phase(Phase::Reconstruct)
                    })?;
                    seed.read_at(offset, &mut block[..len])
                        .map_err(|e| e.in_phase(Phase::Reconstruct))?;
                    out.write_all(&block[..len])
                        .map_err(|e| Error::io("writing local block", e).in_phase(Phase::Reconstruct))?;
                    stats.bytes_local += len as u64;
                }
                BlockSlot::Missing => {
                    let data = fetched.take(DataRange::new(start, start + len as u64))?;
                    out.write_all(&data)
                        .map_err(|e| Error::io("writing fetched block", e).in_phase(Phase::Reconstruct))?;
                    stats.bytes_fetched += len as u64;
                }
            }

            written += len as u64;
            self.progress.update(written);
        }

        stats.batches = fetched.batches;
        self.progress.finish();

        tracing::debug!(
            bytes_local = stats.bytes_local,
            bytes_fetched = stats.bytes_fetched,
            batches = stats.batches,
            "Reconstruction written"
        );

        Ok(stats)
    }
}
