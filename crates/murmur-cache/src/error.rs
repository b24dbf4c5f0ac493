//! Error types for murmur-cache.

use murmur_signal::SignalError;
use thiserror::Error;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors reading or writing the backing store.
///
/// Missing or malformed content is not an error; it reads as an empty cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors resolving a channel.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The cache could not be read or written.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The miner failed. Nothing was persisted.
    #[error("mining failed: {0}")]
    Mining(#[from] SignalError),

    /// The target prefix is not a 32-byte hex overlay.
    #[error("invalid target prefix {prefix:?}: {reason}")]
    InvalidTarget { prefix: String, reason: String },

    /// A cached record holds undecodable identifiers.
    #[error("corrupt cache record for {channel_id}/{target_prefix}: {reason}")]
    CorruptRecord {
        channel_id: String,
        target_prefix: String,
        reason: String,
    },
}
