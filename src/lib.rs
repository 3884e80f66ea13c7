//! blockfetch - rolling-checksum delta file synchronization
//!
//! Given a recipe describing a target file block by block, this library finds
//! the blocks that already exist somewhere in a local file, fetches only the
//! missing byte ranges (over HTTP or from another local copy), reassembles the
//! target and verifies it against the recipe's whole-file digest.

pub mod backup;
pub mod cancel;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod delta;
pub mod error;
pub mod format;
pub mod local;
pub mod progress;
pub mod recipe;
pub mod retry;
pub mod source;
pub mod sync;
pub mod uri;

pub use cancel::CancelFlag;
pub use config::Config;
pub use delta::{BlockMap, BlockSlot, DataRange};
pub use error::{Error, Phase, Result};
pub use recipe::{ChecksumRecord, Recipe};
pub use source::{FetchedRange, RangeSource};
pub use sync::{CompletionReport, SyncEngine};
