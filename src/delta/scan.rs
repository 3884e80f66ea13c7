//! Single-pass scan of the local file for target blocks
//!
//! The file is read in large chunks. The bytes of the current window that have
//! not been consumed yet are carried to the front of the buffer before the next
//! chunk is read, so every window, including ones that straddle two reads, is
//! contiguous when its strong checksum is computed.

use super::{BlockHashIndex, BlockMap};
use crate::cancel::CancelFlag;
use crate::checksum::rolling::{truncate_weak, RollingChecksum};
use crate::checksum::strong::block_sum;
use crate::error::{Error, Result};
use crate::progress::{ProgressSink, NO_PROGRESS};
use crate::recipe::Recipe;
use std::io::{self, Read};

/// Default read size for the scan (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Counters from one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Bytes of local data read
    pub bytes_scanned: u64,
    /// Windows whose weak sum hit the index
    pub weak_hits: u64,
    /// Weak hits that failed strong confirmation
    pub false_alarms: u64,
    /// Confirmed block matches
    pub matches: u64,
}

/// Read buffer holding the current window plus read-ahead
struct WindowBuffer<R> {
    reader: R,
    buf: Vec<u8>,
    /// Index of the current window's first byte
    start: usize,
    /// End of valid (read or zero-padded) data
    end: usize,
    eof: bool,
    bytes_read: u64,
}

impl<R: Read> WindowBuffer<R> {
    fn new(reader: R, chunk_size: usize, block_size: usize) -> Self {
        Self {
            reader,
            buf: vec![0u8; chunk_size + block_size + 1],
            start: 0,
            end: 0,
            eof: false,
            bytes_read: 0,
        }
    }

    /// Make `need` bytes available from the window start, reading the next
    /// chunk if required. Bytes past the end of the file read as zero.
    /// Returns true if a read happened.
    fn ensure(&mut self, need: usize) -> io::Result<bool> {
        if self.start + need <= self.end {
            return Ok(false);
        }

        // Carry the unconsumed tail to the front of the buffer
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;

        let mut refilled = false;
        while self.end < need {
            if self.eof {
                self.buf[self.end..need].fill(0);
                self.end = need;
                break;
            }
            match self.reader.read(&mut self.buf[self.end..]) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    self.end += n;
                    self.bytes_read += n as u64;
                    refilled = true;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(refilled)
    }

    #[inline]
    fn window(&self, len: usize) -> &[u8] {
        &self.buf[self.start..self.start + len]
    }

    #[inline]
    fn byte(&self, offset: usize) -> u8 {
        self.buf[self.start + offset]
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.start += n;
        debug_assert!(self.start <= self.end);
    }
}

/// Streams a local file once and records which target blocks it contains
pub struct LocalScanner<'a> {
    block_size: usize,
    weak_width: usize,
    strong_width: usize,
    chunk_size: usize,
    progress: &'a dyn ProgressSink,
    cancel: CancelFlag,
}

impl<'a> LocalScanner<'a> {
    /// Create a scanner using the recipe's block geometry and checksum widths
    pub fn new(recipe: &Recipe) -> Self {
        Self {
            block_size: recipe.block_size,
            weak_width: recipe.weak_width,
            strong_width: recipe.strong_width,
            chunk_size: DEFAULT_CHUNK_SIZE.max(recipe.block_size),
            progress: &NO_PROGRESS,
            cancel: CancelFlag::new(),
        }
    }

    /// Set the read size; never smaller than one block
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(self.block_size);
        self
    }

    /// Report scanned bytes to `progress`
    pub fn progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Stop between chunks once `cancel` is set
    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Scan `local_len` bytes of `reader`, consuming matched records from
    /// `index` and marking them found in `map`.
    pub fn scan<R: Read>(
        &self,
        reader: R,
        local_len: u64,
        index: &mut BlockHashIndex,
        map: &mut BlockMap,
    ) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let bs = self.block_size;
        if bs == 0 {
            return Err(Error::recipe("block size must be non-zero"));
        }
        if local_len == 0 || index.is_empty() {
            return Ok(stats);
        }
        self.cancel.check()?;

        tracing::debug!(
            local_size = local_len,
            block_size = bs,
            chunk_size = self.chunk_size,
            blocks = index.remaining(),
            "Starting local scan"
        );
        self.progress.start("scan", local_len);

        let mut window = WindowBuffer::new(reader.take(local_len), self.chunk_size, bs);
        window
            .ensure(bs)
            .map_err(|e| Error::io("reading local file", e))?;
        let mut rolling = RollingChecksum::new(window.window(bs));
        let mut pos: u64 = 0;

        loop {
            let weak = truncate_weak(rolling.value(), self.weak_width);
            let mut step = 1usize;

            if index.probe(weak) {
                stats.weak_hits += 1;
                let strong = block_sum(window.window(bs), self.strong_width);
                if let Some(record) = index.confirm(weak, &strong) {
                    map.set_found(record.sequence_index, pos)?;
                    stats.matches += 1;
                    tracing::trace!(block = record.sequence_index, offset = pos, "Block matched");
                    if index.is_empty() {
                        break;
                    }
                    // The matched region is not searched again
                    step = bs;
                } else {
                    stats.false_alarms += 1;
                }
            }

            if pos + step as u64 >= local_len {
                break;
            }

            let refilled = if step == 1 {
                let refilled = window
                    .ensure(bs + 1)
                    .map_err(|e| Error::io("reading local file", e))?;
                rolling.roll(window.byte(0), window.byte(bs));
                window.advance(1);
                refilled
            } else {
                let refilled = window
                    .ensure(step + bs)
                    .map_err(|e| Error::io("reading local file", e))?;
                window.advance(step);
                rolling = RollingChecksum::new(window.window(bs));
                refilled
            };
            pos += step as u64;

            if refilled {
                self.progress.update(window.bytes_read);
                self.cancel.check()?;
            }
        }

        stats.bytes_scanned = window.bytes_read;
        self.progress.finish();

        tracing::debug!(
            matches = stats.matches,
            weak_hits = stats.weak_hits,
            false_alarms = stats.false_alarms,
            "Local scan complete"
        );

        Ok(stats)
    }
}
