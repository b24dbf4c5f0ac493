//! Murmur Cache - mined channel persistence and resolution
//!
//! Mining a channel is expensive, so every result is persisted keyed by the
//! exact `(channel_id, proximity_depth, target_prefix)` tuple that produced
//! it. Resolving the same tuple again, in this process or a later one,
//! returns the same resource id without mining.
//!
//! - **Codec**: hex for identifiers crossing the persistence boundary
//! - **Store**: [`AddressCache`] with a JSON file and an in-memory backend
//! - **Resolver**: [`ChannelResolver`], get-or-mine over a cache and a miner

pub mod codec;
pub mod error;
pub mod record;
pub mod resolver;
pub mod store;

pub use error::{CacheError, ResolveError, Result};
pub use record::{CacheRecord, MiningInputs, MiningResult};
pub use resolver::{parse_target, ChannelResolver, Origin, Resolution};
pub use store::{AddressCache, JsonFileCache, MemoryCache, DEFAULT_CACHE_FILE};
