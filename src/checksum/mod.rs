//! Weak (rolling) and strong checksums

pub mod rolling;
pub mod strong;

pub use rolling::{pack, truncate_weak, unpack, weak_mask, RollingChecksum};
pub use strong::{block_sum, digest_bytes, digest_file, padded_block_sum, FileDigest, FileHasher};
