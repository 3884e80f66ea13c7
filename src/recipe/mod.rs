//! Recipes: the block-by-block description of a target file

pub mod file;
pub mod generate;

pub use file::{read_recipe, read_recipe_from_bytes, write_recipe, write_recipe_to_bytes};
pub use generate::{generate_recipe, generate_recipe_from_bytes, RecipeParams};

use crate::checksum::rolling::{weak_mask, MAX_WEAK_WIDTH, MIN_WEAK_WIDTH};
use crate::checksum::strong::{FileDigest, MAX_STRONG_WIDTH};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Magic bytes for recipe files
pub const RECIPE_MAGIC: &[u8; 6] = b"BFRCP\x01";

/// Current recipe format version
pub const RECIPE_VERSION: u8 = 1;

/// File extension for recipe files
pub const RECIPE_EXTENSION: &str = "bfr";

/// Largest block size a recipe may declare (64 MiB)
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Default number of ranges requested per fetch
pub const DEFAULT_MAX_RANGES: usize = 100;

/// Expected fingerprint of one target block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    /// Position of the block in the target file (0-based)
    pub sequence_index: usize,

    /// Rolling checksum, already truncated to the recipe's weak width
    pub weak_sum: u32,

    /// Truncated MD4 of the (zero-padded) block
    #[serde(with = "hex_bytes")]
    pub strong_sum: Vec<u8>,
}

impl ChecksumRecord {
    /// Create a new checksum record
    pub fn new(sequence_index: usize, weak_sum: u32, strong_sum: Vec<u8>) -> Self {
        Self {
            sequence_index,
            weak_sum,
            strong_sum,
        }
    }
}

/// Parsed description of a target file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Name the target file is saved under
    pub filename: String,

    /// Where the target's bytes can be fetched (absolute, or relative to the recipe)
    pub url: Option<String>,

    /// Block size used for chunking
    pub block_size: usize,

    /// Exact target length in bytes
    pub length: u64,

    /// Bytes of the rolling checksum stored per block (2-4)
    pub weak_width: usize,

    /// Bytes of MD4 stored per block
    pub strong_width: usize,

    /// SHA-1 of the whole target file
    #[serde(with = "hex_digest")]
    pub sha1: FileDigest,

    /// Modification time to stamp on the result (Unix seconds)
    pub mtime: Option<u64>,

    /// Maximum ranges asked for in one request
    pub max_ranges_per_request: usize,

    /// Drop matches that have no matched neighbour
    pub sequence_validation: bool,

    /// One record per block, in order
    pub blocks: Vec<ChecksumRecord>,
}

impl Recipe {
    /// Number of target blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of blocks a target of this length must have
    pub fn expected_block_count(&self) -> usize {
        if self.block_size == 0 {
            return 0;
        }
        self.length.div_ceil(self.block_size as u64) as usize
    }

    /// True length of block `index` (the final block may be short)
    pub fn block_len(&self, index: usize) -> usize {
        let start = index as u64 * self.block_size as u64;
        let remaining = self.length.saturating_sub(start);
        remaining.min(self.block_size as u64) as usize
    }

    /// Offset of block `index` in the target file
    pub fn block_offset(&self, index: usize) -> u64 {
        index as u64 * self.block_size as u64
    }

    /// Declared modification time, if any
    pub fn modification_time(&self) -> Option<SystemTime> {
        self.mtime.map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Bare file name to save the target under.
    ///
    /// Directory components in the recipe's `filename` are ignored so a recipe
    /// cannot direct output outside the working directory.
    pub fn target_name(&self) -> Result<PathBuf> {
        Path::new(&self.filename)
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| Error::recipe(format!("unusable target filename {:?}", self.filename)))
    }

    /// Hex form of the expected whole-file digest
    pub fn sha1_hex(&self) -> String {
        hex::encode(self.sha1)
    }

    /// Check the recipe is internally consistent before anything trusts it
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::recipe("block size must be non-zero"));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(Error::recipe(format!(
                "block size {} exceeds the maximum of {}",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        if !(MIN_WEAK_WIDTH..=MAX_WEAK_WIDTH).contains(&self.weak_width) {
            return Err(Error::recipe(format!(
                "weak checksum width {} outside {}..={}",
                self.weak_width, MIN_WEAK_WIDTH, MAX_WEAK_WIDTH
            )));
        }
        if !(1..=MAX_STRONG_WIDTH).contains(&self.strong_width) {
            return Err(Error::recipe(format!(
                "strong checksum width {} outside 1..={}",
                self.strong_width, MAX_STRONG_WIDTH
            )));
        }
        if self.max_ranges_per_request == 0 {
            return Err(Error::recipe("max ranges per request must be non-zero"));
        }
        if self.blocks.len() != self.expected_block_count() {
            return Err(Error::recipe(format!(
                "recipe lists {} blocks but a {}-byte file with {}-byte blocks has {}",
                self.blocks.len(),
                self.length,
                self.block_size,
                self.expected_block_count()
            )));
        }

        let mask = weak_mask(self.weak_width);
        for (position, record) in self.blocks.iter().enumerate() {
            if record.sequence_index != position {
                return Err(Error::recipe(format!(
                    "block record {} carries sequence index {}",
                    position, record.sequence_index
                )));
            }
            if record.strong_sum.len() != self.strong_width {
                return Err(Error::recipe(format!(
                    "block {} strong sum is {} bytes, expected {}",
                    position,
                    record.strong_sum.len(),
                    self.strong_width
                )));
            }
            if record.weak_sum & !mask != 0 {
                return Err(Error::recipe(format!(
                    "block {} weak sum {:#x} is wider than {} bytes",
                    position, record.weak_sum, self.weak_width
                )));
            }
        }

        Ok(())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

mod hex_digest {
    use crate::checksum::strong::FileDigest;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &FileDigest, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FileDigest, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut digest = FileDigest::default();
        hex::decode_to_slice(&s, &mut digest).map_err(serde::de::Error::custom)?;
        Ok(digest)
    }
}
