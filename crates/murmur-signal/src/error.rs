//! Error types for murmur-signal.

use thiserror::Error;

use crate::consensus::ValidationError;

/// Result type for signal operations.
pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors raised by miners and channels.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Payload rejected by the consensus rule before it was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Socket error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Requested proximity depth is above what the miner will search.
    #[error("proximity depth {requested} exceeds maximum {max}")]
    DepthTooLarge { requested: u8, max: u8 },

    /// The search space was exhausted without a match.
    #[error("no channel address within depth {depth} after {attempts} attempts")]
    Exhausted { depth: u8, attempts: u64 },

    /// A write was attempted without a postage stamp.
    #[error("write requires a postage stamp")]
    Unstamped,

    /// The encoded envelope does not fit in one datagram.
    #[error("envelope of {size} bytes exceeds datagram limit of {max}")]
    Oversized { size: usize, max: usize },

    /// The channel has shut down.
    #[error("channel closed")]
    Closed,

    /// A background task failed.
    #[error("task failed: {0}")]
    Task(String),
}
