//! Range source backed by a local copy of the target

use super::{FetchedRange, RangeSource};
use crate::delta::DataRange;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Serves ranges from a file on disk (local mirrors, tests)
pub struct FileSource {
    path: PathBuf,
    file: File,
    len: u64,
    bytes_received: u64,
    requests: usize,
}

impl FileSource {
    /// Open the target copy at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_path_buf(),
            },
            _ => Error::io(format!("opening {}", path.display()), e),
        })?;
        let len = file
            .metadata()
            .map_err(|e| Error::io("reading metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            bytes_received: 0,
            requests: 0,
        })
    }

    /// Size of the underlying file
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn read_range(&mut self, range: DataRange) -> Result<Bytes> {
        if range.end > self.len {
            return Err(Error::malformed(format!(
                "range {} past end of {} ({} bytes)",
                range,
                self.path.display(),
                self.len
            )));
        }

        let mut buf = vec![0u8; range.len() as usize];
        self.file
            .seek(SeekFrom::Start(range.start))
            .map_err(|e| Error::io("seeking in source file", e))?;
        self.file
            .read_exact(&mut buf)
            .map_err(|e| Error::io("reading source file", e))?;
        Ok(Bytes::from(buf))
    }
}

impl RangeSource for FileSource {
    fn fetch_ranges(&mut self, ranges: &[DataRange]) -> Result<Vec<FetchedRange>> {
        self.requests += 1;
        let mut fetched = Vec::with_capacity(ranges.len());
        for &range in ranges {
            let data = self.read_range(range)?;
            self.bytes_received += data.len() as u64;
            fetched.push(FetchedRange::new(range, data));
        }

        tracing::trace!(
            source = %self.path.display(),
            ranges = ranges.len(),
            "Served ranges from file"
        );
        Ok(fetched)
    }

    fn fetch_whole(&mut self, out: &mut dyn Write) -> Result<u64> {
        self.requests += 1;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("seeking in source file", e))?;
        let copied = io::copy(&mut self.file, out).map_err(|e| Error::io("copying source file", e))?;
        self.bytes_received += copied;
        Ok(copied)
    }

    fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    fn requests(&self) -> usize {
        self.requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn source_with(data: &[u8]) -> (NamedTempFile, FileSource) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        let source = FileSource::open(file.path()).unwrap();
        (file, source)
    }

    #[test]
    fn test_fetch_ranges_in_order() {
        let (_file, mut source) = source_with(b"0123456789");
        let fetched = source
            .fetch_ranges(&[DataRange::new(6, 8), DataRange::new(0, 2)])
            .unwrap();

        assert_eq!(fetched[0].range, DataRange::new(6, 8));
        assert_eq!(&fetched[0].data[..], b"67");
        assert_eq!(&fetched[1].data[..], b"01");
        assert_eq!(source.bytes_received(), 4);
        assert_eq!(source.requests(), 1);
    }

    #[test]
    fn test_range_past_end() {
        let (_file, mut source) = source_with(b"short");
        let result = source.fetch_ranges(&[DataRange::new(3, 10)]);
        assert!(matches!(result, Err(Error::MalformedResponse { .. })));
    }

    #[test]
    fn test_fetch_whole() {
        let (_file, mut source) = source_with(b"whole file");
        let mut out = Vec::new();
        assert_eq!(source.fetch_whole(&mut out).unwrap(), 10);
        assert_eq!(out, b"whole file");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSource::open(&dir.path().join("absent"));
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
