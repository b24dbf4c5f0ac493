//! UDP datagram signal.
//!
//! One JSON [`Envelope`] per datagram, sent to a fixed endpoint. A single
//! receive pump, started by the first subscription, fans admitted payloads
//! out to every subscriber of the envelope's resource id.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{admit, Delivery, Envelope, SentReceipt, SignalChannel, Subscription};
use crate::consensus::Consensus;
use crate::error::{Result, SignalError};
use crate::types::ResourceId;

/// Largest envelope sent or received.
pub const MAX_DATAGRAM: usize = 8 * 1024;

/// UDP signal configuration.
#[derive(Debug, Clone)]
pub struct UdpSignalConfig {
    /// Local address to bind.
    pub bind: SocketAddr,
    /// Where writes are sent.
    pub endpoint: SocketAddr,
    /// Postage stamp attached to writes.
    pub stamp: Option<String>,
    /// Send buffer size in bytes.
    pub sndbuf: usize,
    /// Receive buffer size in bytes.
    pub rcvbuf: usize,
}

impl UdpSignalConfig {
    pub fn new(bind: SocketAddr, endpoint: SocketAddr) -> Self {
        Self {
            bind,
            endpoint,
            stamp: None,
            sndbuf: 1024 * 1024,
            rcvbuf: 1024 * 1024,
        }
    }

    pub fn with_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.stamp = Some(stamp.into());
        self
    }
}

type Subscribers = Arc<Mutex<HashMap<ResourceId, Vec<mpsc::Sender<Delivery>>>>>;

/// Signal channel over a UDP socket.
pub struct UdpSignal {
    socket: Arc<UdpSocket>,
    endpoint: SocketAddr,
    stamp: Option<String>,
    consensus: Consensus,
    subscribers: Subscribers,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl UdpSignal {
    /// Bind the socket with the configured buffer sizes.
    pub async fn bind(config: UdpSignalConfig, consensus: Consensus) -> Result<Self> {
        let domain = if config.bind.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_send_buffer_size(config.sndbuf)?;
        socket.set_recv_buffer_size(config.rcvbuf)?;
        socket.set_reuse_address(true)?;
        socket.bind(&config.bind.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;

        info!(
            "UDP signal bound to {} (endpoint {}, consensus {:?})",
            socket.local_addr()?,
            config.endpoint,
            consensus.id()
        );

        Ok(Self {
            socket: Arc::new(socket),
            endpoint: config.endpoint,
            stamp: config.stamp,
            consensus,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            pump: Mutex::new(None),
        })
    }

    /// The local address this signal is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn ensure_pump(&self) {
        let mut pump = self.pump.lock().unwrap_or_else(|e| e.into_inner());
        if pump.is_some() {
            return;
        }
        let socket = Arc::clone(&self.socket);
        let subscribers = Arc::clone(&self.subscribers);
        let consensus = self.consensus.clone();
        *pump = Some(tokio::spawn(run_pump(socket, subscribers, consensus)));
    }
}

impl Drop for UdpSignal {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

fn senders_for(subscribers: &Subscribers, resource_id: &ResourceId) -> Vec<mpsc::Sender<Delivery>> {
    let map = subscribers.lock().unwrap_or_else(|e| e.into_inner());
    map.get(resource_id).cloned().unwrap_or_default()
}

fn all_senders(subscribers: &Subscribers) -> Vec<mpsc::Sender<Delivery>> {
    let map = subscribers.lock().unwrap_or_else(|e| e.into_inner());
    map.values().flatten().cloned().collect()
}

async fn run_pump(socket: Arc<UdpSocket>, subscribers: Subscribers, consensus: Consensus) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("UDP receive error: {}", e);
                for tx in all_senders(&subscribers) {
                    let fault = std::io::Error::new(e.kind(), e.to_string());
                    let _ = tx.send(Err(SignalError::Io(fault))).await;
                }
                continue;
            }
        };

        let envelope: Envelope = match serde_json::from_slice(&buf[..len]) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Ignoring malformed datagram from {}: {}", from, e);
                continue;
            }
        };
        let Ok(resource_id) = ResourceId::from_hex(&envelope.resource_id) else {
            debug!("Ignoring datagram from {} with bad resource id", from);
            continue;
        };

        let senders = senders_for(&subscribers, &resource_id);
        if senders.is_empty() {
            continue;
        }
        let Some(payload) = admit(&consensus, &resource_id, envelope) else {
            continue;
        };
        for tx in senders {
            let _ = tx.send(Ok(payload.clone())).await;
        }
    }
}

#[async_trait]
impl SignalChannel for UdpSignal {
    fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    async fn write(&self, payload: &Value, resource_id: &ResourceId) -> Result<SentReceipt> {
        let stamp = self.stamp.clone().ok_or(SignalError::Unstamped)?;
        let envelope = Envelope::seal(&self.consensus, resource_id, Some(stamp), payload)?;
        let bytes = serde_json::to_vec(&envelope)?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(SignalError::Oversized {
                size: bytes.len(),
                max: MAX_DATAGRAM,
            });
        }
        self.socket.send_to(&bytes, self.endpoint).await?;
        envelope.receipt(resource_id)
    }

    async fn subscribe(&self, resource_id: ResourceId) -> Result<Subscription> {
        let (tx, subscription) = Subscription::channel(resource_id);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(resource_id)
            .or_default()
            .push(tx);
        self.ensure_pump();
        debug!("Subscribed to {}", resource_id.short());
        Ok(subscription)
    }
}
