//! In-process signal hub.
//!
//! Every [`MemorySignal`] attached to the same [`MemoryHub`] sees every
//! envelope written through any of them, the way peers on one broadcast
//! network would. Used by tests and as a loopback transport.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::channel::{admit, Envelope, SentReceipt, SignalChannel, Subscription};
use crate::consensus::Consensus;
use crate::error::{Result, SignalError};
use crate::types::ResourceId;

const HUB_CAPACITY: usize = 1024;

/// Shared broadcast medium.
#[derive(Debug, Clone)]
pub struct MemoryHub {
    tx: broadcast::Sender<Envelope>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Attach a peer enforcing `consensus`.
    pub fn signal(&self, consensus: Consensus) -> MemorySignal {
        MemorySignal {
            hub: self.clone(),
            consensus,
        }
    }

    /// Inject a raw envelope, bypassing any sender-side validation.
    pub fn inject(&self, envelope: Envelope) {
        let _ = self.tx.send(envelope);
    }
}

/// One peer on a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemorySignal {
    hub: MemoryHub,
    consensus: Consensus,
}

#[async_trait]
impl SignalChannel for MemorySignal {
    fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    async fn write(&self, payload: &Value, resource_id: &ResourceId) -> Result<SentReceipt> {
        let envelope = Envelope::seal(&self.consensus, resource_id, None, payload)?;
        let receipt = envelope.receipt(resource_id)?;
        // No receivers is not an error on a broadcast medium.
        let _ = self.hub.tx.send(envelope);
        Ok(receipt)
    }

    async fn subscribe(&self, resource_id: ResourceId) -> Result<Subscription> {
        let mut rx = self.hub.tx.subscribe();
        let (tx, subscription) = Subscription::channel(resource_id);
        let consensus = self.consensus.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if let Some(payload) = admit(&consensus, &resource_id, envelope) {
                            if tx.send(Ok(payload)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscription on {} lagged by {}", resource_id.short(), skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(Err(SignalError::Closed)).await;
                        break;
                    }
                }
            }
        });

        Ok(subscription)
    }
}
