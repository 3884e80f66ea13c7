//! Range fetch capability: where missing target bytes come from
//!
//! A source answers a batch of byte ranges with one payload per range, in the
//! order the ranges were requested. Every payload carries the range it answers
//! so the consumer can detect a source that breaks that contract.

pub mod file;
pub mod http;

pub use file::FileSource;
pub use http::HttpSource;

use crate::config::Config;
use crate::delta::DataRange;
use crate::error::{Error, Result};
use crate::recipe::{read_recipe, read_recipe_from_bytes, Recipe};
use crate::uri::Location;
use bytes::Bytes;
use std::io::Write;

/// Payload for one requested range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRange {
    /// The range this payload answers
    pub range: DataRange,
    /// The bytes of that range
    pub data: Bytes,
}

impl FetchedRange {
    pub fn new(range: DataRange, data: Bytes) -> Self {
        Self { range, data }
    }
}

/// Blocking, ordered access to the target file's bytes
pub trait RangeSource {
    /// Fetch `ranges` and return their payloads in request order
    fn fetch_ranges(&mut self, ranges: &[DataRange]) -> Result<Vec<FetchedRange>>;

    /// Stream the whole target into `out`, returning the byte count
    fn fetch_whole(&mut self, out: &mut dyn Write) -> Result<u64>;

    /// Bytes actually transferred, including protocol overhead
    fn bytes_received(&self) -> u64;

    /// Number of requests issued so far
    fn requests(&self) -> usize;
}

/// Open a source for the target data at `location`
pub fn open_source(location: &Location, config: &Config) -> Result<Box<dyn RangeSource + Send>> {
    match location {
        Location::Local(path) => Ok(Box::new(FileSource::open(path)?)),
        Location::Http(url) => Ok(Box::new(HttpSource::new(url.clone(), config)?)),
    }
}

/// A validated recipe and what it cost to obtain
#[derive(Debug, Clone)]
pub struct LoadedRecipe {
    pub recipe: Recipe,
    /// Bytes transferred to download the recipe, zero when read locally
    pub bytes_downloaded: u64,
}

/// Read the recipe at `location`, downloading it if it is remote
pub fn load_recipe(location: &Location, config: &Config) -> Result<LoadedRecipe> {
    let (recipe, bytes_downloaded) = match location {
        Location::Local(path) => (read_recipe(path)?, 0),
        Location::Http(url) => {
            let mut source = HttpSource::new(url.clone(), config)?;
            let data = source.fetch_all()?;
            (read_recipe_from_bytes(&data)?, source.bytes_received())
        }
    };
    recipe.validate()?;
    Ok(LoadedRecipe {
        recipe,
        bytes_downloaded,
    })
}

/// Where the target's bytes come from: an explicit override, or the
/// recipe's `url` resolved against the recipe's own location
pub fn resolve_data_location(
    recipe_location: &Location,
    recipe: &Recipe,
    explicit: Option<&str>,
) -> Result<Location> {
    if let Some(explicit) = explicit {
        return Location::parse(explicit);
    }
    match recipe.url.as_deref() {
        Some(url) => recipe_location.join(url),
        None => Err(Error::config(
            "recipe does not say where the target is; pass --url",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{generate_recipe_from_bytes, write_recipe};
    use std::path::PathBuf;

    #[test]
    fn test_load_local_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bfr");
        let recipe = generate_recipe_from_bytes(b"some target bytes", 4);
        write_recipe(&recipe, &path).unwrap();

        let loaded = load_recipe(&Location::Local(path), &Config::default()).unwrap();
        assert_eq!(loaded.recipe.sha1, recipe.sha1);
        assert_eq!(loaded.recipe.blocks, recipe.blocks);
        assert_eq!(loaded.bytes_downloaded, 0);
    }

    #[test]
    fn test_resolve_data_location() {
        let mut recipe = generate_recipe_from_bytes(b"abc", 4);
        let base = Location::parse("http://example.com/pub/file.bfr").unwrap();

        assert!(matches!(
            resolve_data_location(&base, &recipe, None),
            Err(Error::Config { .. })
        ));

        recipe.url = Some("file.iso".to_string());
        assert_eq!(
            resolve_data_location(&base, &recipe, None).unwrap().to_uri(),
            "http://example.com/pub/file.iso"
        );

        let explicit = resolve_data_location(&base, &recipe, Some("/mirror/file.iso")).unwrap();
        assert_eq!(explicit, Location::Local(PathBuf::from("/mirror/file.iso")));
    }
}
