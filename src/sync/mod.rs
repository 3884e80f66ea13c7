//! Sync engine and orchestration
//!
//! scan seed -> sequence validation -> (full download | coalesce, fetch and
//! reconstruct) -> verify -> commit

pub mod reconstruct;
pub mod verify;

pub use reconstruct::{check_batch, ReconstructStats, Reconstructor};
pub use verify::{create_temp, finish_temp, verify_and_commit};

use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::delta::{BlockHashIndex, BlockMap, LocalScanner, ScanStats};
use crate::error::{Error, Phase, Result};
use crate::local::SeedFile;
use crate::progress::{ProgressSink, NO_PROGRESS};
use crate::recipe::Recipe;
use crate::source::RangeSource;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Buffer between block writes and the temporary file
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// What a successful synchronization did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionReport {
    /// Bytes copied from the seed file
    pub bytes_local: u64,
    /// Target bytes obtained from the source
    pub bytes_fetched: u64,
    /// Bytes actually transferred, including protocol overhead and the recipe
    pub bytes_received: u64,
    /// Bytes spent downloading the recipe
    pub recipe_bytes: u64,
    /// Requests issued to the source
    pub range_requests: usize,
    /// Blocks in the target
    pub blocks_total: usize,
    /// Blocks taken from the seed file
    pub blocks_found: usize,
    /// The delta path was skipped in favour of fetching the whole file
    pub full_download: bool,
    /// Where the previous version of the target was kept
    pub backup: Option<PathBuf>,
    /// Wall time of the whole run
    pub elapsed: Duration,
}

impl CompletionReport {
    /// Share of blocks served locally, as a percentage
    pub fn percent_complete(&self) -> f64 {
        if self.blocks_total == 0 {
            return 0.0;
        }
        (self.blocks_found as f64 / self.blocks_total as f64) * 100.0
    }

    /// Transfer overhead relative to the target bytes fetched
    pub fn overhead_percent(&self) -> Option<f64> {
        if self.bytes_fetched == 0 {
            return None;
        }
        let extra = self.bytes_received as f64 - self.bytes_fetched as f64;
        Some(extra / self.bytes_fetched as f64 * 100.0)
    }

    /// Share of the target that did not have to be fetched
    pub fn savings_percent(&self) -> f64 {
        let total = self.bytes_local + self.bytes_fetched;
        if total == 0 {
            return 0.0;
        }
        (self.bytes_local as f64 / total as f64) * 100.0
    }
}

/// The main sync engine
pub struct SyncEngine<'a> {
    /// Description of the target
    recipe: Recipe,
    /// Where missing bytes come from
    source: &'a mut dyn RangeSource,
    /// Configuration
    config: Config,
    /// Progress sink
    progress: &'a dyn ProgressSink,
    /// Checked between scan chunks and blocks
    cancel: CancelFlag,
    /// Already spent on the recipe, counted in the report
    recipe_bytes: u64,
}

impl<'a> SyncEngine<'a> {
    /// Create a new sync engine
    pub fn new(recipe: Recipe, source: &'a mut dyn RangeSource, config: Config) -> Self {
        Self {
            recipe,
            source,
            config,
            progress: &NO_PROGRESS,
            cancel: CancelFlag::new(),
            recipe_bytes: 0,
        }
    }

    pub fn progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bytes transferred to obtain the recipe
    pub fn recipe_bytes(mut self, bytes: u64) -> Self {
        self.recipe_bytes = bytes;
        self
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    fn sequence_validation(&self) -> bool {
        self.config
            .sequence_validation
            .unwrap_or(self.recipe.sequence_validation)
    }

    fn max_ranges(&self) -> usize {
        self.config
            .max_ranges
            .unwrap_or(self.recipe.max_ranges_per_request)
    }

    /// Bring `target` up to date, using `seed` as the local source of blocks
    pub fn run(&mut self, seed: Option<&Path>, target: &Path) -> Result<CompletionReport> {
        let start = Instant::now();
        self.recipe.validate()?;

        let seed = match seed {
            Some(path) => SeedFile::open_if_exists(path).map_err(|e| e.in_phase(Phase::Scan))?,
            None => None,
        }
        .filter(|seed| !seed.is_empty());

        let mut map = BlockMap::new(self.recipe.block_count());
        if let Some(seed) = &seed {
            let stats = self.scan(seed, &mut map).map_err(|e| e.in_phase(Phase::Scan))?;
            let dropped = if self.sequence_validation() {
                map.drop_isolated()
            } else {
                0
            };

            tracing::info!(
                seed = %seed.path().display(),
                scanned = stats.bytes_scanned,
                matched = stats.matches,
                dropped,
                percent = format!("{:.1}%", map.percent_complete()),
                "Scanned seed file"
            );
        }

        let mut report = CompletionReport {
            blocks_total: map.len(),
            blocks_found: map.found_count(),
            ..Default::default()
        };

        let mut temp = create_temp(target).map_err(|e| e.in_phase(Phase::Reconstruct))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, temp.as_file_mut());

        if map.found_count() == 0 {
            tracing::info!(
                target = %target.display(),
                "No usable local data, fetching whole file"
            );
            self.cancel.check()?;
            self.progress.start("download", self.recipe.length);
            let fetched = self
                .source
                .fetch_whole(&mut writer)
                .map_err(|e| e.in_phase(Phase::Fetch))?;
            self.progress.finish();
            report.full_download = true;
            report.bytes_fetched = fetched;
        } else {
            let stats = Reconstructor::new(&self.recipe, &map, seed.as_ref())
                .max_ranges(self.max_ranges())
                .progress(self.progress)
                .cancel(self.cancel.clone())
                .write_to(&mut *self.source, &mut writer)?;
            report.bytes_local = stats.bytes_local;
            report.bytes_fetched = stats.bytes_fetched;
        }

        writer
            .flush()
            .map_err(|e| Error::io("writing temporary file", e).in_phase(Phase::Reconstruct))?;
        drop(writer);

        // Release the seed's lock before it may be renamed away
        drop(seed);

        finish_temp(&mut temp, &self.recipe).map_err(|e| e.in_phase(Phase::Reconstruct))?;
        report.backup = verify_and_commit(temp, &self.recipe, target, &self.config)?;

        report.recipe_bytes = self.recipe_bytes;
        report.bytes_received = self.source.bytes_received() + self.recipe_bytes;
        report.range_requests = self.source.requests();
        report.elapsed = start.elapsed();

        tracing::info!(
            target = %target.display(),
            bytes_local = report.bytes_local,
            bytes_fetched = report.bytes_fetched,
            bytes_received = report.bytes_received,
            recipe_bytes = report.recipe_bytes,
            requests = report.range_requests,
            full_download = report.full_download,
            "Synchronization complete"
        );

        Ok(report)
    }

    fn scan(&self, seed: &SeedFile, map: &mut BlockMap) -> Result<ScanStats> {
        let mut index = BlockHashIndex::new(self.recipe.blocks.iter().cloned());
        LocalScanner::new(&self.recipe)
            .chunk_size(self.config.chunk_size)
            .progress(self.progress)
            .cancel(self.cancel.clone())
            .scan(seed.reader()?, seed.len(), &mut index, map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_percentages() {
        let report = CompletionReport {
            bytes_local: 750,
            bytes_fetched: 250,
            bytes_received: 300,
            blocks_total: 4,
            blocks_found: 3,
            ..Default::default()
        };
        assert!((report.percent_complete() - 75.0).abs() < 1e-9);
        assert!((report.savings_percent() - 75.0).abs() < 1e-9);
        assert!((report.overhead_percent().unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_recipe_download_counts_as_overhead() {
        let report = CompletionReport {
            bytes_fetched: 1000,
            bytes_received: 1050,
            recipe_bytes: 50,
            ..Default::default()
        };
        assert!((report.overhead_percent().unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_without_fetch() {
        let report = CompletionReport {
            bytes_local: 100,
            blocks_total: 1,
            blocks_found: 1,
            ..Default::default()
        };
        assert!(report.overhead_percent().is_none());
        assert_eq!(report.savings_percent(), 100.0);
    }
}
