//! Proof-of-search over resource ids.
//!
//! Mining finds a [`ResourceId`] whose derived [`ChannelAddress`] lies within
//! a proximity depth of a target [`Overlay`]. The search is deterministic in
//! `(channel_id, target, depth)`: two parties mining the same inputs end up
//! on the same channel without talking to each other.
//!
//! ```text
//! resource_id = blake3(channel_id ‖ ":" ‖ nonce_be)
//! address     = blake3("murmur/channel" ‖ resource_id)
//! accept when proximity(address, target) >= depth
//! ```
//!
//! Expected cost is `2^depth` hashes, so depth is capped at [`MAX_DEPTH`].

use async_trait::async_trait;

use crate::error::{Result, SignalError};
use crate::proximity::within_depth;
use crate::types::{ChannelAddress, Overlay, ResourceId};

/// Maximum proximity depth a [`LocalMiner`] will search for.
pub const MAX_DEPTH: u8 = 24;

/// Maximum nonces tried before giving up.
pub const MAX_ITERATIONS: u64 = 1 << 26;

const ADDRESS_DOMAIN: &[u8] = b"murmur/channel";

/// A mined channel: the resource id and the address it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinedChannel {
    pub resource_id: ResourceId,
    pub address: ChannelAddress,
}

/// Something that can mine a channel near a target.
///
/// Implementations may take arbitrarily long and fail only on transport or
/// internal errors.
#[async_trait]
pub trait Miner: Send + Sync {
    async fn mine(&self, channel_id: &str, target: &Overlay, depth: u8) -> Result<MinedChannel>;
}

#[async_trait]
impl<T: Miner + ?Sized> Miner for std::sync::Arc<T> {
    async fn mine(&self, channel_id: &str, target: &Overlay, depth: u8) -> Result<MinedChannel> {
        (**self).mine(channel_id, target, depth).await
    }
}

/// Derive the channel address a resource id broadcasts on.
pub fn channel_address(resource_id: &ResourceId) -> ChannelAddress {
    let mut hasher = blake3::Hasher::new();
    hasher.update(ADDRESS_DOMAIN);
    hasher.update(resource_id.as_bytes());
    ChannelAddress(*hasher.finalize().as_bytes())
}

/// Candidate resource id for a nonce.
pub fn candidate(channel_id: &str, nonce: u64) -> ResourceId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(channel_id.as_bytes());
    hasher.update(b":");
    hasher.update(&nonce.to_be_bytes());
    ResourceId(*hasher.finalize().as_bytes())
}

/// Synchronous search. Prefer [`LocalMiner`] from async code.
pub fn search(channel_id: &str, target: &Overlay, depth: u8) -> Result<MinedChannel> {
    if depth > MAX_DEPTH {
        return Err(SignalError::DepthTooLarge {
            requested: depth,
            max: MAX_DEPTH,
        });
    }

    for nonce in 0..MAX_ITERATIONS {
        let resource_id = candidate(channel_id, nonce);
        let address = channel_address(&resource_id);
        if within_depth(address.as_bytes(), target.as_bytes(), depth) {
            return Ok(MinedChannel {
                resource_id,
                address,
            });
        }
    }

    Err(SignalError::Exhausted {
        depth,
        attempts: MAX_ITERATIONS,
    })
}

/// In-process miner running the search on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMiner;

impl LocalMiner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Miner for LocalMiner {
    async fn mine(&self, channel_id: &str, target: &Overlay, depth: u8) -> Result<MinedChannel> {
        let channel_id = channel_id.to_string();
        let target = *target;
        let started = std::time::Instant::now();
        let mined = tokio::task::spawn_blocking(move || search(&channel_id, &target, depth))
            .await
            .map_err(|e| SignalError::Task(e.to_string()))??;
        tracing::debug!(
            "Mined {} at depth {} in {:?}",
            mined.resource_id.short(),
            depth,
            started.elapsed()
        );
        Ok(mined)
    }
}
