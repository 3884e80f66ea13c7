//! Recipe generation from a target file

use super::{ChecksumRecord, Recipe, DEFAULT_MAX_RANGES, MAX_BLOCK_SIZE};
use crate::checksum::rolling::{truncate_weak, RollingChecksum};
use crate::checksum::strong::{padded_block_sum, FileHasher};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Checksum widths and matching policy for a target of a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeParams {
    /// Bytes of rolling checksum per block
    pub weak_width: usize,
    /// Bytes of MD4 per block
    pub strong_width: usize,
    /// Whether isolated matches should be discarded
    pub sequence_validation: bool,
}

impl RecipeParams {
    /// Pick checksum widths so that false matches stay improbable for a file of
    /// `length` bytes split into `block_size` blocks.
    pub fn for_length(length: u64, block_size: usize) -> Self {
        let seq_matches: f64 = if length > block_size as u64 { 2.0 } else { 1.0 };
        let len = (length.max(1)) as f64;
        let blocks_plus_one = (1 + length / block_size.max(1) as u64) as f64;

        let weak = (((len.log2() + (block_size.max(1) as f64).log2()) - 8.6) / seq_matches / 8.0)
            .ceil()
            .clamp(2.0, 4.0) as usize;

        let strong_needed = ((20.0 + len.log2() + blocks_plus_one.log2()) / seq_matches / 8.0).ceil();
        let strong_floor = ((7.9 + 20.0 + blocks_plus_one.log2()) / 8.0).floor();
        let strong = strong_needed.max(strong_floor).clamp(3.0, 16.0) as usize;

        Self {
            weak_width: weak,
            strong_width: strong,
            sequence_validation: seq_matches > 1.0,
        }
    }
}

/// Incrementally builds block records as target bytes stream in
struct RecipeBuilder {
    block_size: usize,
    params: RecipeParams,
    blocks: Vec<ChecksumRecord>,
    hasher: FileHasher,
    length: u64,
}

impl RecipeBuilder {
    fn new(block_size: usize, params: RecipeParams) -> Self {
        Self {
            block_size,
            params,
            blocks: Vec::new(),
            hasher: FileHasher::new(),
            length: 0,
        }
    }

    /// Add one block; only the final block may be shorter than `block_size`
    fn push_block(&mut self, block: &[u8]) {
        let mut padded;
        let window = if block.len() < self.block_size {
            padded = block.to_vec();
            padded.resize(self.block_size, 0);
            &padded[..]
        } else {
            block
        };

        let weak = truncate_weak(RollingChecksum::new(window).value(), self.params.weak_width);
        let strong = padded_block_sum(block, self.block_size, self.params.strong_width);

        self.blocks
            .push(ChecksumRecord::new(self.blocks.len(), weak, strong));
        self.hasher.update(block);
        self.length += block.len() as u64;
    }

    fn finish(self, filename: String, mtime: Option<u64>) -> Recipe {
        Recipe {
            filename,
            url: None,
            block_size: self.block_size,
            length: self.length,
            weak_width: self.params.weak_width,
            strong_width: self.params.strong_width,
            sha1: self.hasher.finalize(),
            mtime,
            max_ranges_per_request: DEFAULT_MAX_RANGES,
            sequence_validation: self.params.sequence_validation,
            blocks: self.blocks,
        }
    }
}

/// Generate a recipe for a file on disk
pub fn generate_recipe(path: &Path, block_size: usize) -> Result<Recipe> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(Error::recipe(format!(
            "block size must be between 1 and {}",
            MAX_BLOCK_SIZE
        )));
    }

    let file = File::open(path).map_err(|e| Error::io("opening file", e))?;
    let metadata = file.metadata().map_err(|e| Error::io("reading metadata", e))?;
    let params = RecipeParams::for_length(metadata.len(), block_size);
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    let mut reader = BufReader::with_capacity(1 << 20, file.take(metadata.len()));
    let mut builder = RecipeBuilder::new(block_size, params);
    let mut buffer = vec![0u8; block_size];

    loop {
        let filled = read_full(&mut reader, &mut buffer)?;
        if filled == 0 {
            break;
        }
        builder.push_block(&buffer[..filled]);
        if filled < block_size {
            break;
        }
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    tracing::debug!(
        path = %path.display(),
        blocks = builder.blocks.len(),
        weak_width = params.weak_width,
        strong_width = params.strong_width,
        "Generated recipe"
    );

    Ok(builder.finish(filename, mtime))
}

/// Generate a recipe from a byte slice (for testing)
pub fn generate_recipe_from_bytes(data: &[u8], block_size: usize) -> Recipe {
    let params = RecipeParams::for_length(data.len() as u64, block_size);
    let mut builder = RecipeBuilder::new(block_size, params);
    for chunk in data.chunks(block_size.max(1)) {
        builder.push_block(chunk);
    }
    builder.finish(String::from("target"), None)
}

/// Read until `buf` is full or the reader is exhausted
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io("reading file", e)),
        }
    }
    Ok(filled)
}
