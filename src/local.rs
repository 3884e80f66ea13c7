//! Read-only access to the local seed file
//!
//! The seed is opened once with a shared (read) lock that is held for the scan
//! and the reconstruction, so cooperating processes cannot truncate or
//! exclusively lock it while matched blocks are still being copied out.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A locally available older (or related) version of the target
pub struct SeedFile {
    path: PathBuf,
    /// Kept open to hold the lock; released on drop
    file: File,
    len: u64,
}

impl SeedFile {
    /// Open `path` read-only and take a shared lock on it
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_path_buf(),
            },
            _ => Error::io(format!("opening seed file {}", path.display()), e),
        })?;

        // Blocks while another process holds an exclusive lock
        FileExt::lock_shared(&file).map_err(|e| Error::io("acquiring shared file lock", e))?;

        let metadata = file
            .metadata()
            .map_err(|e| Error::io("reading seed metadata", e))?;
        if !metadata.is_file() {
            return Err(Error::io(
                format!("{} is not a regular file", path.display()),
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: metadata.len(),
        })
    }

    /// Like [`SeedFile::open`], but a missing file is `None`
    pub fn open_if_exists(path: &Path) -> Result<Option<Self>> {
        match Self::open(path) {
            Ok(seed) => Ok(Some(seed)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size when the file was opened
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A reader positioned at the start of the file
    pub fn reader(&self) -> Result<&File> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("rewinding seed file", e))?;
        Ok(file)
    }

    /// Fill `buf` with the bytes at `offset`.
    ///
    /// Bytes past the end of the file read as zero, matching the padding the
    /// scan applied to windows that ran past EOF.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let available = self.len.saturating_sub(offset).min(buf.len() as u64) as usize;
        let (data, padding) = buf.split_at_mut(available);

        if !data.is_empty() {
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| Error::io("seeking in seed file", e))?;
            file.read_exact(data).map_err(|e| {
                Error::io(format!("reading {} bytes at offset {}", data.len(), offset), e)
            })?;
        }
        padding.fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn seed_with(data: &[u8]) -> (tempfile::NamedTempFile, SeedFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        let seed = SeedFile::open(file.path()).unwrap();
        (file, seed)
    }

    #[test]
    fn test_read_at() {
        let (_file, seed) = seed_with(b"0123456789");
        let mut buf = [0u8; 4];
        seed.read_at(3, &mut buf).unwrap();
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn test_read_at_zero_fills_past_eof() {
        let (_file, seed) = seed_with(b"abcdef");
        let mut buf = [0xFFu8; 5];
        seed.read_at(4, &mut buf).unwrap();
        assert_eq!(&buf, b"ef\0\0\0");

        let mut buf = [0xFFu8; 2];
        seed.read_at(100, &mut buf).unwrap();
        assert_eq!(buf, [0, 0]);
    }

    #[test]
    fn test_reader_rewinds() {
        let (_file, seed) = seed_with(b"hello");
        let mut first = String::new();
        seed.reader().unwrap().read_to_string(&mut first).unwrap();
        let mut second = String::new();
        seed.reader().unwrap().read_to_string(&mut second).unwrap();
        assert_eq!(first, "hello");
        assert_eq!(second, "hello");
    }

    #[test]
    fn test_open_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SeedFile::open_if_exists(&dir.path().join("nope"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_shared_locks_coexist() {
        let (file, _seed) = seed_with(b"data");
        let second = SeedFile::open(file.path()).unwrap();
        assert_eq!(second.len(), 4);
    }
}
