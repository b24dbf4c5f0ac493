//! Murmur Chat - two-party chat over mined broadcast channels
//!
//! Each party listens on a channel mined near its own overlay and writes to
//! the channel mined near the other party's overlay. Channel resolution goes
//! through the persistent cache, so restarts never re-mine.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use murmur_cache::{ChannelResolver, JsonFileCache};
//! use murmur_chat::{ChatConfig, Console, Session};
//! use murmur_signal::{Consensus, LocalMiner, UdpSignal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChatConfig::from_env()?;
//!     let signal = UdpSignal::bind(config.signal_config(), Consensus::messages(&config.channel_id)).await?;
//!     let resolver = ChannelResolver::new(JsonFileCache::new(&config.cache_path), LocalMiner::new());
//!     let session = Session::establish(config.plan(), &resolver, signal, Arc::new(Console::stdout())).await?;
//!     let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//!     session.run(stdin, std::future::pending()).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod session;

pub use config::{ChatConfig, ConfigError, Role, SessionPlan};
pub use console::{Console, PROMPT};
pub use error::{ChatError, Result};
pub use session::{
    parse_line, ChannelHandle, InputAction, Session, SessionOutcome, SessionState, EXIT_KEYWORD,
};
