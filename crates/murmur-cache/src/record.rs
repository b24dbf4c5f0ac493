//! Cache record types.

use murmur_signal::{ChannelAddress, MinedChannel, ResourceId};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::ResolveError;

/// The identity of a mining request.
///
/// Equality is exact on all three fields: no normalization of the prefix
/// and no prefix-containment matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MiningInputs {
    /// Shared topic namespace (also the consensus id).
    pub channel_id: String,
    /// Leading bits the channel address must share with the target.
    pub proximity_depth: u8,
    /// Hex overlay the channel address must be close to.
    pub target_prefix: String,
}

impl MiningInputs {
    pub fn new(
        channel_id: impl Into<String>,
        proximity_depth: u8,
        target_prefix: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            proximity_depth,
            target_prefix: target_prefix.into(),
        }
    }
}

/// The outcome of resolving a [`MiningInputs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningResult {
    pub resource_id: ResourceId,
    pub channel_address: ChannelAddress,
}

impl From<MinedChannel> for MiningResult {
    fn from(mined: MinedChannel) -> Self {
        Self {
            resource_id: mined.resource_id,
            channel_address: mined.address,
        }
    }
}

/// One persisted entry: identifiers stored as hex next to their inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub resource_id: String,
    pub channel_address: String,
    pub inputs: MiningInputs,
}

impl CacheRecord {
    /// Record a result under the inputs that produced it.
    pub fn new(inputs: MiningInputs, result: &MiningResult) -> Self {
        Self {
            resource_id: codec::encode(result.resource_id.as_bytes()),
            channel_address: codec::encode(result.channel_address.as_bytes()),
            inputs,
        }
    }

    /// Decode the stored identifiers.
    pub fn result(&self) -> Result<MiningResult, ResolveError> {
        let corrupt = |reason: String| ResolveError::CorruptRecord {
            channel_id: self.inputs.channel_id.clone(),
            target_prefix: self.inputs.target_prefix.clone(),
            reason,
        };
        let resource_id = codec::decode(&self.resource_id)
            .and_then(|b| ResourceId::from_slice(&b))
            .map_err(|e| corrupt(format!("resource id: {e}")))?;
        let channel_address = codec::decode(&self.channel_address)
            .and_then(|b| ChannelAddress::from_slice(&b))
            .map_err(|e| corrupt(format!("channel address: {e}")))?;
        Ok(MiningResult {
            resource_id,
            channel_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> MiningResult {
        MiningResult {
            resource_id: ResourceId([0x11; 32]),
            channel_address: ChannelAddress([0x75; 32]),
        }
    }

    #[test]
    fn record_decodes_to_original_result() {
        let record = CacheRecord::new(MiningInputs::new("c1", 16, "7570"), &result());
        assert_eq!(record.resource_id, "11".repeat(32));
        assert_eq!(record.result().unwrap(), result());
    }

    #[test]
    fn corrupt_record_is_reported() {
        let mut record = CacheRecord::new(MiningInputs::new("c1", 16, "7570"), &result());
        record.resource_id = "zz".into();
        assert!(matches!(
            record.result(),
            Err(ResolveError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn inputs_compare_exactly() {
        let a = MiningInputs::new("c1", 16, "75ab");
        assert_eq!(a, MiningInputs::new("c1", 16, "75ab"));
        assert_ne!(a, MiningInputs::new("c1", 16, "75ab00"));
        assert_ne!(a, MiningInputs::new("c1", 16, "75AB"));
        assert_ne!(a, MiningInputs::new("c1", 8, "75ab"));
        assert_ne!(a, MiningInputs::new("c2", 16, "75ab"));
    }

    #[test]
    fn serialized_shape() {
        let record = CacheRecord::new(MiningInputs::new("c1", 16, "7570"), &result());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["inputs"]["channel_id"], "c1");
        assert_eq!(value["inputs"]["proximity_depth"], 16);
        assert_eq!(value["inputs"]["target_prefix"], "7570");
        assert!(value["channel_address"].is_string());
    }
}
