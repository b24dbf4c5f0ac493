//! Murmur Signal - broadcast channels addressed by mined resource ids
//!
//! The collaborator the chat layer talks to. It knows how to:
//! - mine a resource id whose channel address lies near a target overlay
//! - write a payload to a resource id
//! - subscribe to payloads on a resource id
//!
//! Every payload crossing a channel in either direction is gated by a
//! [`Consensus`] rule. Both peers must run the same rule under the same id
//! or they will drop each other's messages.
//!
//! # Transports
//!
//! - [`UdpSignal`]: one JSON envelope per datagram to a fixed endpoint
//! - [`MemoryHub`]: in-process broadcast for tests and loopback use

pub mod channel;
pub mod consensus;
pub mod error;
pub mod memory;
pub mod miner;
pub mod proximity;
pub mod types;
pub mod udp;

pub use channel::{Delivery, Envelope, SentReceipt, SignalChannel, Subscription};
pub use consensus::{assert_message, Consensus, MessagePayload, Rule, ShapeReport, ValidationError};
pub use error::{Result, SignalError};
pub use memory::{MemoryHub, MemorySignal};
pub use miner::{channel_address, LocalMiner, MinedChannel, Miner, MAX_DEPTH};
pub use proximity::{proximity, within_depth};
pub use types::{ChannelAddress, Overlay, ResourceId, ID_BITS, ID_LEN};
pub use udp::{UdpSignal, UdpSignalConfig, MAX_DATAGRAM};
