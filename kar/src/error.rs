//! Error types for KAR archive operations

use thiserror::Error;

/// Result type for KAR operations
pub type Result<T> = std::result::Result<T, Error>;

/// KAR error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from the underlying source or sink
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupted or not a kar archive
    #[error("invalid archive format: {0}")]
    Format(String),

    /// Entry name not present in the archive index
    #[error("entry {0:?} not found in archive")]
    NotFound(String),

    /// LZ4 frame decode failed
    #[error("LZ4 frame error: {0}")]
    Codec(String),

    /// Builder rejected a repeated entry name
    #[error("entry {0:?} already added")]
    Duplicate(String),

    /// Builder used after a failed operation or after sealing
    #[error("builder is no longer usable after a failure or seal")]
    Poisoned,

    /// Encoded header exceeded the reserved region
    #[error("encoded header ({encoded} bytes) exceeds reserved region ({reserved} bytes)")]
    Invariant { encoded: u64, reserved: u64 },
}
