//! Error types for murmur-chat.
//!
//! Startup errors (`Config`, `Resolution`, `Subscribe`) end the process.
//! Steady-state errors (`Validation`, `Transmission`) are reported on the
//! console and the session carries on.

use murmur_cache::ResolveError;
use murmur_signal::{SignalError, ValidationError};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A channel could not be resolved
    #[error("could not resolve channel: {0}")]
    Resolution(#[from] ResolveError),

    /// The inbound subscription could not be established
    #[error("could not subscribe: {0}")]
    Subscribe(SignalError),

    /// Outbound payload failed the consensus rule
    #[error("message not sent: {0}")]
    Validation(#[from] ValidationError),

    /// The channel refused or lost a write
    #[error("failed to send message: {0}")]
    Transmission(SignalError),

    /// Session has no outbound channel
    #[error("this session only listens; nothing was sent")]
    NoOutbound,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether the session can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChatError::Validation(_) | ChatError::Transmission(_) | ChatError::NoOutbound
        )
    }
}

impl From<SignalError> for ChatError {
    fn from(e: SignalError) -> Self {
        match e {
            SignalError::Validation(v) => ChatError::Validation(v),
            other => ChatError::Transmission(other),
        }
    }
}
