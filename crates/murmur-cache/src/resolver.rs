//! Channel resolver: get a cached channel or mine a new one.
//!
//! ```text
//! resolve(inputs)
//!   ├─ cache.find(inputs) ── hit ──▶ decode, return (no mining)
//!   └─ miss ─▶ miner.mine(channel_id, target, depth)
//!              └─ cache.append(record) ─▶ return
//! ```
//!
//! The cache is consulted before mining, never after, so each distinct
//! input tuple is mined at most once per store. A failed mine writes
//! nothing.

use murmur_signal::{Miner, Overlay};
use tracing::info;

use crate::error::ResolveError;
use crate::record::{CacheRecord, MiningInputs, MiningResult};
use crate::store::AddressCache;

/// Where a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Found in the cache.
    Cached,
    /// Freshly mined and persisted.
    Mined,
}

/// A resolved channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub inputs: MiningInputs,
    pub result: MiningResult,
    pub origin: Origin,
}

/// Parse a target prefix into an overlay.
pub fn parse_target(prefix: &str) -> Result<Overlay, ResolveError> {
    Overlay::from_hex(prefix).map_err(|e| ResolveError::InvalidTarget {
        prefix: prefix.to_string(),
        reason: e.to_string(),
    })
}

/// Resolves mining inputs to channels, reusing cached work.
pub struct ChannelResolver<C, M> {
    cache: C,
    miner: M,
}

impl<C: AddressCache, M: Miner> ChannelResolver<C, M> {
    pub fn new(cache: C, miner: M) -> Self {
        Self { cache, miner }
    }

    /// The backing cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// The miner used on cache misses.
    pub fn miner(&self) -> &M {
        &self.miner
    }

    /// Get or mine the channel for `inputs`.
    pub async fn resolve(&self, inputs: &MiningInputs) -> Result<Resolution, ResolveError> {
        if let Some(record) = self.cache.find(inputs)? {
            let result = record.result()?;
            info!(
                "Using cached channel {} for overlay {}",
                result.channel_address, inputs.target_prefix
            );
            return Ok(Resolution {
                inputs: inputs.clone(),
                result,
                origin: Origin::Cached,
            });
        }

        let target = parse_target(&inputs.target_prefix)?;
        info!(
            "Mining channel for overlay {} at depth {}...",
            inputs.target_prefix, inputs.proximity_depth
        );
        let mined = self
            .miner
            .mine(&inputs.channel_id, &target, inputs.proximity_depth)
            .await?;
        let result = MiningResult::from(mined);

        self.cache.append(CacheRecord::new(inputs.clone(), &result))?;
        info!("New channel mined, address {}", result.channel_address);

        Ok(Resolution {
            inputs: inputs.clone(),
            result,
            origin: Origin::Mined,
        })
    }
}
