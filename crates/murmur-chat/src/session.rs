//! Session orchestrator.
//!
//! ```text
//! Initializing ─▶ ResolvingChannels ─▶ Ready ⇄ Sending
//!                                        │
//!                     exit / signal / EOF ▼
//!                                   Terminating ─▶ Terminated
//! ```
//!
//! Two independent paths run once the session is ready:
//! - the inbound task drains the subscription and prints deliveries
//! - the input loop reads one line at a time and awaits each send fully
//!   before reading the next
//!
//! They share only the console. Channel handles are fixed after
//! resolution. Inbound deliveries never wait on a send in flight.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use murmur_cache::{AddressCache, ChannelResolver, MiningInputs, Origin, Resolution};
use murmur_signal::{ChannelAddress, MessagePayload, Miner, ResourceId, SentReceipt, SignalChannel, Subscription};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionPlan;
use crate::console::Console;
use crate::error::{ChatError, Result};

/// Typed (case-insensitively, surrounding whitespace ignored) to quit.
pub const EXIT_KEYWORD: &str = "exit";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    ResolvingChannels,
    /// Listening (if subscribed) and waiting for input.
    Ready,
    Sending,
    Terminating,
    Terminated,
}

/// Why a session ended. Every outcome is a successful exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The user typed the exit keyword.
    ExitKeyword,
    /// A termination signal arrived.
    Interrupted,
    /// Standard input was closed.
    InputClosed,
}

/// What one line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Exit,
    Send(String),
}

/// Interpret one line of input.
pub fn parse_line(line: &str) -> InputAction {
    let input = line.trim();
    if input.eq_ignore_ascii_case(EXIT_KEYWORD) {
        InputAction::Exit
    } else {
        InputAction::Send(input.to_string())
    }
}

/// A resolved channel bound to this session. Rebuilt from the cache on
/// every start; never cloned or persisted.
#[derive(Debug)]
pub struct ChannelHandle {
    inputs: MiningInputs,
    resource_id: ResourceId,
    address: ChannelAddress,
}

impl ChannelHandle {
    pub fn inputs(&self) -> &MiningInputs {
        &self.inputs
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }
}

impl From<Resolution> for ChannelHandle {
    fn from(resolution: Resolution) -> Self {
        Self {
            inputs: resolution.inputs,
            resource_id: resolution.result.resource_id,
            address: resolution.result.channel_address,
        }
    }
}

/// A two-way conversation over one inbound and one outbound channel.
pub struct Session<S, W> {
    signal: S,
    console: Arc<Console<W>>,
    inbound: Option<ChannelHandle>,
    outbound: Option<ChannelHandle>,
    subscription: Option<Subscription>,
    state: SessionState,
}

impl<S, W> Session<S, W>
where
    S: SignalChannel,
    W: Write + Send + 'static,
{
    /// Resolve the planned channels and subscribe to the inbound one.
    ///
    /// Any failure here is fatal; nothing is retried.
    pub async fn establish<C, M>(
        plan: SessionPlan,
        resolver: &ChannelResolver<C, M>,
        signal: S,
        console: Arc<Console<W>>,
    ) -> Result<Self>
    where
        C: AddressCache,
        M: Miner,
    {
        let mut session = Self {
            signal,
            console,
            inbound: None,
            outbound: None,
            subscription: None,
            state: SessionState::Initializing,
        };

        session.transition(SessionState::ResolvingChannels);
        session.console.notice("Initializing channels...");

        if let Some(inputs) = plan.own {
            let handle = session.resolve(resolver, &inputs).await?;
            session.inbound = Some(handle);
        }
        if let Some(inputs) = plan.remote {
            let handle = session.resolve(resolver, &inputs).await?;
            session.outbound = Some(handle);
        }

        if let Some(inbound) = &session.inbound {
            let subscription = session
                .signal
                .subscribe(inbound.resource_id)
                .await
                .map_err(ChatError::Subscribe)?;
            session.console.notice(&format!(
                "Listening for messages on channel {}",
                inbound.address
            ));
            session.subscription = Some(subscription);
        }

        session.transition(SessionState::Ready);
        Ok(session)
    }

    async fn resolve<C, M>(
        &self,
        resolver: &ChannelResolver<C, M>,
        inputs: &MiningInputs,
    ) -> Result<ChannelHandle>
    where
        C: AddressCache,
        M: Miner,
    {
        let resolution = resolver.resolve(inputs).await?;
        let verb = match resolution.origin {
            Origin::Cached => "Using cached",
            Origin::Mined => "Mined new",
        };
        self.console.notice(&format!(
            "{} channel {} for overlay {}",
            verb, resolution.result.channel_address, inputs.target_prefix
        ));
        Ok(ChannelHandle::from(resolution))
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn inbound(&self) -> Option<&ChannelHandle> {
        self.inbound.as_ref()
    }

    pub fn outbound(&self) -> Option<&ChannelHandle> {
        self.outbound.as_ref()
    }

    /// Validate and transmit one message on the outbound channel.
    pub async fn send_text(&mut self, text: String) -> Result<SentReceipt> {
        let Some(outbound) = &self.outbound else {
            return Err(ChatError::NoOutbound);
        };
        let resource_id = outbound.resource_id;

        let payload = MessagePayload::now(text).to_value();
        self.signal.consensus().assert_valid(&payload)?;

        self.transition(SessionState::Sending);
        let sent = self.signal.write(&payload, &resource_id).await;
        self.transition(SessionState::Ready);
        Ok(sent?)
    }

    /// Run until the exit keyword, `shutdown`, or end of input.
    ///
    /// A listen-only session keeps listening after its input closes and
    /// ends only on `shutdown` or the exit keyword. A send in flight when
    /// `shutdown` fires is abandoned.
    pub async fn run<R, F>(mut self, input: R, shutdown: F) -> SessionOutcome
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let inbound_task = self.subscription.take().map(|subscription| {
            spawn_inbound(subscription, Arc::clone(&self.console))
        });

        let ready = if self.outbound.is_some() {
            "Ready to send messages. Type \"exit\" to quit."
        } else {
            "Listening only. Type \"exit\" to quit."
        };
        self.console.notice(ready);

        tokio::pin!(shutdown);
        let mut lines = input.lines();

        let outcome = loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = &mut shutdown => break SessionOutcome::Interrupted,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) if self.outbound.is_none() => {
                    info!("Input closed, listening until shutdown");
                    (&mut shutdown).await;
                    break SessionOutcome::Interrupted;
                }
                Ok(None) => break SessionOutcome::InputClosed,
                Err(e) => {
                    warn!("Input error: {}", e);
                    self.console.error(&format!("failed to read input: {e}"));
                    break SessionOutcome::InputClosed;
                }
            };

            let text = match parse_line(&line) {
                InputAction::Exit => break SessionOutcome::ExitKeyword,
                InputAction::Send(text) => text,
            };

            let sent = tokio::select! {
                sent = self.send_text(text) => sent,
                _ = &mut shutdown => break SessionOutcome::Interrupted,
            };
            match sent {
                Ok(receipt) => self
                    .console
                    .notice(&format!("Message sent. ({})", receipt.to_hex())),
                Err(e) => self.console.error(&e.to_string()),
            }
        };

        self.transition(SessionState::Terminating);
        self.console.farewell("Exiting...");
        if let Some(task) = inbound_task {
            task.abort();
        }
        self.transition(SessionState::Terminated);
        info!("Session ended: {:?}", outcome);
        outcome
    }
}

fn spawn_inbound<W>(mut subscription: Subscription, console: Arc<Console<W>>) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(delivery) = subscription.next().await {
            match delivery {
                Ok(payload) => console.incoming(&payload),
                Err(e) => console.error(&format!("subscription error: {e}")),
            }
        }
        debug!("Subscription on {} closed", subscription.resource_id().short());
    })
}
