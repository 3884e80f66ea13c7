//! Location parsing for recipes and data sources

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// Where a recipe or the target data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Local filesystem path
    Local(PathBuf),

    /// HTTP or HTTPS URL
    Http(Url),
}

impl Location {
    /// Parse a location string into a Location enum
    pub fn parse(s: &str) -> Result<Self> {
        if let Some((scheme, _)) = s.split_once("://") {
            match scheme.to_lowercase().as_str() {
                "http" | "https" => return Self::parse_http(s),
                "file" => {
                    let url = Url::parse(s).map_err(|e| invalid(s, e.to_string()))?;
                    let path = url
                        .to_file_path()
                        .map_err(|_| invalid(s, "not a local file URL"))?;
                    return Ok(Location::Local(path));
                }
                other => {
                    return Err(invalid(s, format!("unsupported scheme '{}'", other)));
                }
            }
        }

        Ok(Location::Local(PathBuf::from(s)))
    }

    fn parse_http(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| invalid(s, e.to_string()))?;
        if url.host_str().is_none() {
            return Err(invalid(s, "missing host"));
        }
        Ok(Location::Http(url))
    }

    /// Resolve `reference` (possibly relative) against this location.
    ///
    /// Absolute URLs stand alone. A relative reference replaces the last
    /// path segment of this location, the way a browser resolves links.
    pub fn join(&self, reference: &str) -> Result<Location> {
        if reference.contains("://") {
            return Location::parse(reference);
        }

        match self {
            Location::Http(base) => {
                let url = base
                    .join(reference)
                    .map_err(|e| invalid(reference, e.to_string()))?;
                Ok(Location::Http(url))
            }
            Location::Local(path) => {
                let reference = Path::new(reference);
                if reference.is_absolute() {
                    return Ok(Location::Local(reference.to_path_buf()));
                }
                let dir = path.parent().unwrap_or_else(|| Path::new(""));
                Ok(Location::Local(dir.join(reference)))
            }
        }
    }

    /// Convert back to a URI string
    pub fn to_uri(&self) -> String {
        match self {
            Location::Local(path) => path.display().to_string(),
            Location::Http(url) => url.to_string(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

fn invalid(uri: &str, reason: impl Into<String>) -> Error {
    Error::InvalidUri {
        uri: uri.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local() {
        let loc = Location::parse("/path/to/file.iso").unwrap();
        assert_eq!(loc, Location::Local(PathBuf::from("/path/to/file.iso")));

        let loc = Location::parse("./relative/path").unwrap();
        assert_eq!(loc, Location::Local(PathBuf::from("./relative/path")));

        let loc = Location::parse("file:///srv/mirror/file.iso").unwrap();
        assert_eq!(loc, Location::Local(PathBuf::from("/srv/mirror/file.iso")));
    }

    #[test]
    fn test_parse_http() {
        let loc = Location::parse("https://example.com/releases/file.iso").unwrap();
        assert!(matches!(&loc, Location::Http(url) if url.scheme() == "https"));
        assert_eq!(loc.to_uri(), "https://example.com/releases/file.iso");
    }

    #[test]
    fn test_parse_unsupported_scheme() {
        assert!(matches!(
            Location::parse("s3://bucket/key"),
            Err(Error::InvalidUri { .. })
        ));
    }

    #[test]
    fn test_join_relative_http() {
        let base = Location::parse("http://example.com/dist/file.iso.bfr").unwrap();
        let data = base.join("file.iso").unwrap();
        assert_eq!(data.to_uri(), "http://example.com/dist/file.iso");

        let data = base.join("../mirror/file.iso").unwrap();
        assert_eq!(data.to_uri(), "http://example.com/mirror/file.iso");
    }

    #[test]
    fn test_join_absolute_wins() {
        let base = Location::parse("/srv/recipes/file.iso.bfr").unwrap();
        let data = base.join("https://cdn.example.com/file.iso").unwrap();
        assert_eq!(data.to_uri(), "https://cdn.example.com/file.iso");
    }

    #[test]
    fn test_join_relative_local() {
        let base = Location::parse("/srv/recipes/file.iso.bfr").unwrap();
        let data = base.join("file.iso").unwrap();
        assert_eq!(data, Location::Local(PathBuf::from("/srv/recipes/file.iso")));
    }
}
