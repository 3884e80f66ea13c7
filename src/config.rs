//! Configuration management for blockfetch

use crate::delta::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default block size for new recipes
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// Block size used for large targets when none is given
pub const LARGE_FILE_BLOCK_SIZE: usize = 4096;

/// Targets at or above this size get [`LARGE_FILE_BLOCK_SIZE`] (100MB)
pub const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default suffix for the previous version of a replaced file
pub const DEFAULT_BACKUP_SUFFIX: &str = ".zs-old";

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ==================== Output ====================

    /// Show progress bars
    pub progress: bool,

    // ==================== Scan ====================

    /// Read size for the local scan (bytes)
    pub chunk_size: usize,

    /// Block size for recipe generation (0 = pick by file size)
    pub block_size: usize,

    // ==================== Fetch ====================

    /// Override the recipe's maximum ranges per request
    pub max_ranges: Option<usize>,

    /// Override the recipe's sequence validation flag
    pub sequence_validation: Option<bool>,

    /// HTTP request timeout in seconds (0 = no timeout)
    pub http_timeout_secs: u64,

    /// User-Agent header for HTTP requests
    pub user_agent: String,

    /// User name for HTTP basic authentication
    pub username: Option<String>,

    /// Password for HTTP basic authentication
    pub password: Option<String>,

    // ==================== Backup ====================

    /// Keep the previous version of a replaced file
    pub backup: bool,

    /// Directory to store backups
    pub backup_dir: Option<PathBuf>,

    /// Backup suffix (default: .zs-old)
    pub backup_suffix: String,

    // ==================== Retry ====================

    /// Maximum retries for failed requests
    pub max_retries: u32,

    /// Retry delay base in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Output
            progress: true,

            // Scan
            chunk_size: DEFAULT_CHUNK_SIZE,
            block_size: 0,

            // Fetch
            max_ranges: None,
            sequence_validation: None,
            http_timeout_secs: 60,
            user_agent: format!("blockfetch/{}", env!("CARGO_PKG_VERSION")),
            username: None,
            password: None,

            // Backup
            backup: true,
            backup_dir: None,
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),

            // Retry
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io("reading config", e))?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("creating config dir", e))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("serializing config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| Error::io("writing config", e))?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("blockfetch").join("config.toml"))
            .ok_or_else(|| Error::config("could not determine config directory"))
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than zero"));
        }
        if self.max_ranges == Some(0) {
            return Err(Error::config("max_ranges must be greater than zero"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::config("password given without a username"));
        }
        if self.backup && self.backup_dir.is_none() && self.backup_suffix.is_empty() {
            return Err(Error::config("backup_suffix must not be empty"));
        }
        Ok(())
    }

    /// Block size for a new recipe over a target of `file_size` bytes
    pub fn effective_block_size(&self, file_size: u64) -> usize {
        if self.block_size > 0 {
            self.block_size
        } else if file_size >= LARGE_FILE_THRESHOLD {
            LARGE_FILE_BLOCK_SIZE
        } else {
            DEFAULT_BLOCK_SIZE
        }
    }

    /// Credentials for HTTP basic authentication, if a user name is set
    pub fn http_credentials(&self) -> Option<(String, Option<String>)> {
        self.username
            .clone()
            .map(|user| (user, self.password.clone()))
    }

    /// HTTP timeout, if one is configured
    pub fn http_timeout(&self) -> Option<std::time::Duration> {
        (self.http_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.http_timeout_secs))
    }

    /// Parse a size string like "100", "100K", "100M", "100G" into bytes
    pub fn parse_size(s: &str) -> Result<u64> {
        let s = s.trim().to_uppercase();
        if s.is_empty() {
            return Ok(0);
        }

        let (num_part, suffix) = if let Some(n) = s.strip_suffix("KB") {
            (n, 1024u64)
        } else if let Some(n) = s.strip_suffix("MB") {
            (n, 1024u64 * 1024)
        } else if let Some(n) = s.strip_suffix("GB") {
            (n, 1024u64 * 1024 * 1024)
        } else if let Some(n) = s.strip_suffix("TB") {
            (n, 1024u64 * 1024 * 1024 * 1024)
        } else if let Some(n) = s.strip_suffix('K') {
            (n, 1024u64)
        } else if let Some(n) = s.strip_suffix('M') {
            (n, 1024u64 * 1024)
        } else if let Some(n) = s.strip_suffix('G') {
            (n, 1024u64 * 1024 * 1024)
        } else if let Some(n) = s.strip_suffix('T') {
            (n, 1024u64 * 1024 * 1024 * 1024)
        } else if let Some(n) = s.strip_suffix('B') {
            (n, 1u64)
        } else {
            (s.as_str(), 1u64)
        };

        let num: u64 = num_part
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("invalid size value: {}", s)))?;

        num.checked_mul(suffix)
            .ok_or_else(|| Error::config(format!("size value too large: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.progress);
        assert!(config.backup);
        assert_eq!(config.backup_suffix, ".zs-old");
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.max_ranges.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_credentials() {
        let mut config = Config::default();
        assert!(config.http_credentials().is_none());

        config.password = Some("secret".to_string());
        assert!(config.validate().is_err());

        config.username = Some("alice".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(
            config.http_credentials(),
            Some(("alice".to_string(), Some("secret".to_string())))
        );
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(Config::parse_size("100").unwrap(), 100);
        assert_eq!(Config::parse_size("4K").unwrap(), 4096);
        assert_eq!(Config::parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(Config::parse_size("2MB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(Config::parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(Config::parse_size("512B").unwrap(), 512);
        assert_eq!(Config::parse_size("").unwrap(), 0);
        assert!(Config::parse_size("lots").is_err());
        assert!(Config::parse_size("99999999999T").is_err());
    }

    #[test]
    fn test_effective_block_size() {
        let mut config = Config::default();
        assert_eq!(config.effective_block_size(10 * 1024 * 1024), DEFAULT_BLOCK_SIZE);
        assert_eq!(config.effective_block_size(LARGE_FILE_THRESHOLD), LARGE_FILE_BLOCK_SIZE);

        config.block_size = 8192;
        assert_eq!(config.effective_block_size(1), 8192);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("max_ranges = 20\nbackup = false\n").unwrap();
        assert_eq!(config.max_ranges, Some(20));
        assert!(!config.backup);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.chunk_size = 65536;
        config.sequence_validation = Some(false);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.chunk_size, 65536);
        assert_eq!(loaded.sequence_validation, Some(false));
    }

    #[test]
    fn test_validate_rejects_zero_ranges() {
        let config = Config {
            max_ranges: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }
}
