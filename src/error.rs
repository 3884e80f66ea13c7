//! Error types for blockfetch

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for blockfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline phase an error surfaced from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Scanning the local seed file
    Scan,
    /// Fetching missing ranges (or the whole file) from the remote source
    Fetch,
    /// Writing the reconstructed file
    Reconstruct,
    /// Whole-file digest check and final rename
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Scan => "scan",
            Phase::Fetch => "fetch",
            Phase::Reconstruct => "reconstruct",
            Phase::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Main error type for blockfetch
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (file system operations)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Network errors (HTTP, connection issues)
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The remote answered, but not with what was asked for
    #[error("Malformed range response: {message}")]
    MalformedResponse { message: String },

    /// Fetched data does not line up with the block being reconstructed
    #[error("Range order mismatch: expected {expected}, got {actual}")]
    RangeOrder { expected: String, actual: String },

    /// Recipe parse or validation errors
    #[error("Recipe error: {message}")]
    Recipe { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Reconstructed file digest differs from the recipe's digest
    #[error("Integrity check failed: expected SHA-1 {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid URI format
    #[error("Invalid URI: {uri} - {reason}")]
    InvalidUri { uri: String, reason: String },

    /// File not found
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    /// An error tagged with the pipeline phase that produced it
    #[error("{phase} phase failed: {source}")]
    InPhase {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a network error without an underlying client error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a malformed-response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a recipe error
    pub fn recipe(message: impl Into<String>) -> Self {
        Self::Recipe {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Tag this error with a pipeline phase. Already-tagged errors keep their
    /// original phase.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            Error::InPhase { .. } | Error::Cancelled => self,
            other => Error::InPhase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The phase this error was raised in, if it has been tagged
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::InPhase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// The untagged error underneath any phase wrapper
    pub fn root(&self) -> &Error {
        match self {
            Error::InPhase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Error::Network { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}
