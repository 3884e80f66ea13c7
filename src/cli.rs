//! CLI argument parsing for blockfetch

use crate::config::Config;
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// blockfetch - rebuild a remote file from local data plus the ranges that changed
#[derive(Parser, Debug)]
#[command(name = "blockfetch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring a local file up to date with the target a recipe describes
    Fetch(FetchArgs),

    /// Generate a recipe for a file
    Make(MakeArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Recipe path or URL (local path, file://, http://, https://)
    pub recipe: String,

    /// Output file [default: the filename named in the recipe]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Local file to take matching blocks from [default: the output file, or its backup]
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Where to fetch target data from, overriding the recipe's URL
    #[arg(short, long)]
    pub url: Option<String>,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Read size for the local scan (e.g. 1M, 256K)
    #[arg(long, value_parser = parse_size_arg)]
    pub chunk_size: Option<u64>,

    /// Maximum ranges per request, overriding the recipe
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_ranges: Option<u64>,

    /// Discard matched blocks with no matched neighbour (true/false)
    #[arg(long)]
    pub sequence_validation: Option<bool>,

    /// Do not keep the previous version of the output file
    #[arg(long)]
    pub no_backup: bool,

    /// Suffix for the previous version of the output file
    #[arg(long)]
    pub backup_suffix: Option<String>,

    /// Maximum retries for failed requests
    #[arg(long)]
    pub retries: Option<u32>,

    /// User name for HTTP basic authentication
    #[arg(long)]
    pub user: Option<String>,

    /// Password for HTTP basic authentication
    #[arg(long, requires = "user")]
    pub password: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

impl FetchArgs {
    /// Convert CLI args to Config, merging with file config
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load().unwrap_or_default(),
        };

        // CLI args override config file
        if self.no_progress {
            config.progress = false;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size as usize;
        }
        if let Some(max_ranges) = self.max_ranges {
            config.max_ranges = Some(max_ranges as usize);
        }
        if self.sequence_validation.is_some() {
            config.sequence_validation = self.sequence_validation;
        }
        if self.no_backup {
            config.backup = false;
        }
        if let Some(suffix) = &self.backup_suffix {
            config.backup_suffix = suffix.clone();
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(user) = &self.user {
            config.username = Some(user.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the make command
#[derive(Parser, Debug)]
pub struct MakeArgs {
    /// File to describe
    pub file: PathBuf,

    /// Output recipe path [default: <file>.bfr]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Block size (e.g. 2K, 4096) [default: by file size]
    #[arg(short, long, value_parser = parse_size_arg)]
    pub block_size: Option<u64>,

    /// URL the target will be served from [default: the file name]
    #[arg(short, long)]
    pub url: Option<String>,

    /// Name the target is saved under [default: the file name]
    #[arg(short, long)]
    pub filename: Option<String>,

    /// Maximum ranges a client should ask for in one request
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_ranges: Option<u64>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show the configuration file path
    #[arg(long)]
    pub path: bool,

    /// Create default configuration file
    #[arg(long)]
    pub init: bool,
}

fn parse_size_arg(s: &str) -> std::result::Result<u64, String> {
    Config::parse_size(s).map_err(|e| e.to_string())
}
