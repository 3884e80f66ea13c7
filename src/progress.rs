//! Progress tracking and display for blockfetch

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Receiver of progress updates from the pipeline phases
pub trait ProgressSink {
    /// A phase measured in bytes has started
    fn start(&self, _phase: &str, _total: u64) {}

    /// Bytes processed so far in the current phase
    fn update(&self, _position: u64) {}

    /// The current phase is done
    fn finish(&self) {}
}

/// Progress sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Shared no-op sink
pub static NO_PROGRESS: NoProgress = NoProgress;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal progress bar, one phase at a time
pub struct ProgressTracker {
    bar: ProgressBar,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new(enabled: bool) -> Self {
        let bar = if enabled {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg:>12} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%, {bytes_per_sec})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        Self { bar }
    }
}

impl ProgressSink for ProgressTracker {
    fn start(&self, phase: &str, total: u64) {
        self.bar.reset();
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_message(phase.to_string());
        if !self.bar.is_hidden() {
            self.bar.enable_steady_tick(TICK_INTERVAL);
        }
    }

    fn update(&self, position: u64) {
        self.bar.set_position(position);
    }

    fn finish(&self) {
        self.bar.set_position(self.bar.length().unwrap_or(0));
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(true)
    }
}
