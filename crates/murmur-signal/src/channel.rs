//! Channel interface: write to and subscribe on a resource id.
//!
//! Inbound delivery is message passing, not callbacks. A [`Subscription`]
//! owns the receiving half of an mpsc channel fed by the transport's
//! receive pump. Payloads failing the consensus rule never reach it; they
//! are logged and dropped at the pump.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::consensus::{Consensus, MessagePayload};
use crate::error::{Result, SignalError};
use crate::types::ResourceId;

/// Buffered deliveries per subscription before the pump waits.
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// What a subscription yields: a validated message or a transport fault.
pub type Delivery = std::result::Result<MessagePayload, SignalError>;

/// Acknowledgement that a payload was accepted by the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentReceipt {
    /// Content address of the written payload.
    pub address: [u8; 32],
}

impl SentReceipt {
    /// Receipt for a payload written under `resource_id`.
    pub fn for_payload(resource_id: &ResourceId, payload: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(resource_id.as_bytes());
        hasher.update(payload);
        Self {
            address: *hasher.finalize().as_bytes(),
        }
    }

    /// Hex form of the address.
    pub fn to_hex(&self) -> String {
        hex::encode(self.address)
    }
}

/// A live inbound subscription.
#[derive(Debug)]
pub struct Subscription {
    resource_id: ResourceId,
    rx: mpsc::Receiver<Delivery>,
}

impl Subscription {
    /// Create a subscription and the sender that feeds it.
    pub fn channel(resource_id: ResourceId) -> (mpsc::Sender<Delivery>, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (tx, Self { resource_id, rx })
    }

    /// The resource id this subscription listens on.
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// Next delivery, or `None` once the transport is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// A broadcast channel collaborator gated by a [`Consensus`].
#[async_trait]
pub trait SignalChannel: Send + Sync {
    /// The consensus this channel enforces.
    fn consensus(&self) -> &Consensus;

    /// Validate and transmit one payload on `resource_id`.
    async fn write(&self, payload: &Value, resource_id: &ResourceId) -> Result<SentReceipt>;

    /// Start asynchronous delivery of messages on `resource_id`.
    async fn subscribe(&self, resource_id: ResourceId) -> Result<Subscription>;
}

/// What travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Consensus id the sender validated against.
    pub consensus: String,
    /// Hex resource id.
    pub resource_id: String,
    /// Postage stamp, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<String>,
    pub payload: Value,
}

impl Envelope {
    /// Validate `payload` against `consensus` and wrap it.
    pub fn seal(
        consensus: &Consensus,
        resource_id: &ResourceId,
        stamp: Option<String>,
        payload: &Value,
    ) -> Result<Self> {
        consensus.assert_valid(payload)?;
        Ok(Self {
            consensus: consensus.id().to_string(),
            resource_id: resource_id.to_hex(),
            stamp,
            payload: payload.clone(),
        })
    }

    /// Receipt for this envelope's payload.
    pub fn receipt(&self, resource_id: &ResourceId) -> Result<SentReceipt> {
        let bytes = serde_json::to_vec(&self.payload)?;
        Ok(SentReceipt::for_payload(resource_id, &bytes))
    }
}

/// Gate an inbound envelope for a subscriber on `resource_id`.
///
/// Returns `None` for envelopes addressed elsewhere or stamped with another
/// consensus id, and for payloads the rule rejects (logged as errors).
pub fn admit(
    consensus: &Consensus,
    resource_id: &ResourceId,
    envelope: Envelope,
) -> Option<MessagePayload> {
    if envelope.resource_id != resource_id.to_hex() {
        return None;
    }
    if envelope.consensus != consensus.id() {
        debug!(
            "Dropping envelope on {} for consensus {:?} (expected {:?})",
            resource_id.short(),
            envelope.consensus,
            consensus.id()
        );
        return None;
    }
    match consensus.admit(envelope.payload) {
        Ok(payload) => Some(payload),
        Err(e) => {
            error!("Rejected delivery on {}: {}", resource_id.short(), e);
            None
        }
    }
}
