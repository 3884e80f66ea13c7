//! Strong checksums: truncated MD4 per block, SHA-1 over the whole file

use crate::error::{Error, Result};
use digest::Digest;
use md4::Md4;
use sha1::Sha1;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Longest per-block strong sum a recipe may carry (full MD4 output)
pub const MAX_STRONG_WIDTH: usize = 16;

/// Length of the whole-file SHA-1 digest
pub const FILE_DIGEST_LEN: usize = 20;

/// Whole-file digest
pub type FileDigest = [u8; FILE_DIGEST_LEN];

/// MD4 of a block, truncated to `width` bytes
pub fn block_sum(block: &[u8], width: usize) -> Vec<u8> {
    let digest = Md4::digest(block);
    digest[..width.min(MAX_STRONG_WIDTH)].to_vec()
}

/// MD4 of a block that is shorter than `block_size`, zero-padded to full size
pub fn padded_block_sum(block: &[u8], block_size: usize, width: usize) -> Vec<u8> {
    if block.len() >= block_size {
        return block_sum(block, width);
    }
    let mut hasher = Md4::new();
    hasher.update(block);
    hasher.update(vec![0u8; block_size - block.len()]);
    hasher.finalize()[..width.min(MAX_STRONG_WIDTH)].to_vec()
}

/// Incremental whole-file digest
#[derive(Default, Clone)]
pub struct FileHasher {
    inner: Sha1,
}

impl FileHasher {
    /// Start a new digest
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish and return the digest
    pub fn finalize(self) -> FileDigest {
        self.inner.finalize().into()
    }
}

/// Digest of an in-memory buffer
pub fn digest_bytes(data: &[u8]) -> FileDigest {
    Sha1::digest(data).into()
}

/// Stream a file through SHA-1
pub fn digest_file(path: &Path) -> Result<FileDigest> {
    let file = File::open(path).map_err(|e| Error::io("opening file for digest", e))?;
    let mut reader = BufReader::with_capacity(1 << 20, file);
    let mut hasher = FileHasher::new();
    let mut buf = vec![0u8; 1 << 16];

    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| Error::io("reading file for digest", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_md4_known_vector() {
        // RFC 1320: MD4("abc")
        let sum = block_sum(b"abc", 16);
        assert_eq!(hex::encode(sum), "a448017aaf21d8525fc10ae87aa6729d");
    }

    #[test]
    fn test_block_sum_truncates() {
        assert_eq!(block_sum(b"abc", 3), vec![0xa4, 0x48, 0x01]);
    }

    #[test]
    fn test_padded_block_sum() {
        let padded = padded_block_sum(b"ab", 4, 8);
        assert_eq!(padded, block_sum(b"ab\0\0", 8));
    }

    #[test]
    fn test_sha1_known_vector() {
        assert_eq!(
            hex::encode(digest_bytes(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_digest_file_is_stable() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![7u8; 300_000]).unwrap();

        let first = digest_file(file.path()).unwrap();
        let second = digest_file(file.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, digest_bytes(&vec![7u8; 300_000]));
    }
}
