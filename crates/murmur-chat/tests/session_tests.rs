//! End-to-end sessions over the in-memory signal hub.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use murmur_cache::{AddressCache, ChannelResolver, JsonFileCache, MemoryCache, MiningInputs};
use murmur_chat::{ChatError, Console, SessionOutcome, SessionPlan, SessionState, Session, PROMPT};
use murmur_signal::{
    Consensus, Envelope, LocalMiner, MemoryHub, MemorySignal, MinedChannel, Miner, Overlay,
    ResourceId, SentReceipt, SignalChannel, SignalError, Subscription, ValidationError,
};

const CHANNEL: &str = "chat-test";
const DEPTH: u8 = 4;
const ALICE: &str = "7570000000000000000000000000000000000000000000000000000000000000";
const BOB: &str = "2b40000000000000000000000000000000000000000000000000000000000000";

/// Console sink the test can read while the session owns it.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Local miner that counts calls and can be told to fail.
#[derive(Default)]
struct SpyMiner {
    calls: AtomicUsize,
    fail: bool,
}

impl SpyMiner {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Miner for SpyMiner {
    async fn mine(
        &self,
        channel_id: &str,
        target: &Overlay,
        depth: u8,
    ) -> murmur_signal::Result<MinedChannel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SignalError::Task("miner offline".into()));
        }
        LocalMiner::new().mine(channel_id, target, depth).await
    }
}

fn inputs(overlay: &str) -> MiningInputs {
    MiningInputs::new(CHANNEL, DEPTH, overlay)
}

fn plan(own: Option<&str>, remote: Option<&str>) -> SessionPlan {
    SessionPlan {
        own: own.map(inputs),
        remote: remote.map(inputs),
    }
}

fn console() -> (SharedBuf, Arc<Console<SharedBuf>>) {
    let buf = SharedBuf::default();
    (buf.clone(), Arc::new(Console::new(buf)))
}

fn resolver() -> ChannelResolver<MemoryCache, LocalMiner> {
    ChannelResolver::new(MemoryCache::new(), LocalMiner::new())
}

async fn wait_for(buf: &SharedBuf, needle: &str) -> bool {
    let poll = async {
        while !buf.text().contains(needle) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll).await.is_ok()
}

#[tokio::test]
async fn two_parties_exchange_messages() {
    let hub = MemoryHub::new();
    let (alice_out, alice_console) = console();
    let (bob_out, bob_console) = console();

    let alice = Session::establish(
        plan(Some(ALICE), Some(BOB)),
        &resolver(),
        hub.signal(Consensus::messages(CHANNEL)),
        alice_console,
    )
    .await
    .unwrap();
    let bob = Session::establish(
        plan(Some(BOB), Some(ALICE)),
        &resolver(),
        hub.signal(Consensus::messages(CHANNEL)),
        bob_console,
    )
    .await
    .unwrap();

    // Independent caches, same channels.
    assert_eq!(
        alice.outbound().unwrap().resource_id(),
        bob.inbound().unwrap().resource_id()
    );
    assert_eq!(
        bob.outbound().unwrap().resource_id(),
        alice.inbound().unwrap().resource_id()
    );
    assert_eq!(alice.state(), SessionState::Ready);

    let (_bob_keyboard, bob_stdin) = tokio::io::duplex(64);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let bob_task = tokio::spawn(bob.run(tokio::io::BufReader::new(bob_stdin), async {
        let _ = stop_rx.await;
    }));

    let outcome = alice
        .run(&b"hello bob\nexit\n"[..], std::future::pending())
        .await;
    assert_eq!(outcome, SessionOutcome::ExitKeyword);
    assert!(alice_out.text().contains("Message sent."));
    assert!(alice_out.text().contains("Exiting..."));

    assert!(wait_for(&bob_out, "Received message: hello bob").await);

    stop_tx.send(()).unwrap();
    assert_eq!(bob_task.await.unwrap(), SessionOutcome::Interrupted);
}

#[tokio::test]
async fn restart_reuses_cached_channels() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("mined-channels.json");
    let hub = MemoryHub::new();

    let first_miner = Arc::new(SpyMiner::default());
    let first = Session::establish(
        plan(Some(ALICE), Some(BOB)),
        &ChannelResolver::new(JsonFileCache::new(&path), Arc::clone(&first_miner)),
        hub.signal(Consensus::messages(CHANNEL)),
        console().1,
    )
    .await
    .unwrap();
    assert_eq!(first_miner.calls(), 2);

    let second_miner = Arc::new(SpyMiner::default());
    let second = Session::establish(
        plan(Some(ALICE), Some(BOB)),
        &ChannelResolver::new(JsonFileCache::new(&path), Arc::clone(&second_miner)),
        hub.signal(Consensus::messages(CHANNEL)),
        console().1,
    )
    .await
    .unwrap();
    assert_eq!(second_miner.calls(), 0);

    assert_eq!(
        first.inbound().unwrap().resource_id(),
        second.inbound().unwrap().resource_id()
    );
    assert_eq!(
        first.outbound().unwrap().resource_id(),
        second.outbound().unwrap().resource_id()
    );
    assert_eq!(JsonFileCache::new(&path).load().unwrap().len(), 2);
}

#[tokio::test]
async fn same_overlay_both_ways_mines_once() {
    let miner = Arc::new(SpyMiner::default());
    let cache = Arc::new(MemoryCache::new());
    let session = Session::establish(
        plan(Some(ALICE), Some(ALICE)),
        &ChannelResolver::new(Arc::clone(&cache), Arc::clone(&miner)),
        MemoryHub::new().signal(Consensus::messages(CHANNEL)),
        console().1,
    )
    .await
    .unwrap();

    assert_eq!(miner.calls(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(
        session.inbound().unwrap().resource_id(),
        session.outbound().unwrap().resource_id()
    );
}

#[tokio::test]
async fn resolution_failure_is_fatal() {
    let miner = SpyMiner {
        fail: true,
        ..SpyMiner::default()
    };
    let result = Session::establish(
        plan(Some(ALICE), Some(BOB)),
        &ChannelResolver::new(MemoryCache::new(), miner),
        MemoryHub::new().signal(Consensus::messages(CHANNEL)),
        console().1,
    )
    .await;

    match result {
        Err(e @ ChatError::Resolution(_)) => assert!(!e.is_recoverable()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("session should not start"),
    }
}

#[tokio::test]
async fn send_only_forwards_lines_in_order() {
    let hub = MemoryHub::new();
    let (out, console) = console();
    let session = Session::establish(
        plan(None, Some(BOB)),
        &resolver(),
        hub.signal(Consensus::messages(CHANNEL)),
        console,
    )
    .await
    .unwrap();
    assert!(session.inbound().is_none());

    let remote = *session.outbound().unwrap().resource_id();
    let mut observer = hub
        .signal(Consensus::messages(CHANNEL))
        .subscribe(remote)
        .await
        .unwrap();

    let outcome = session
        .run(&b"one\n  two  \n"[..], std::future::pending())
        .await;
    assert_eq!(outcome, SessionOutcome::InputClosed);

    let first = observer.next().await.unwrap().unwrap();
    let second = observer.next().await.unwrap().unwrap();
    assert_eq!(first.text, "one");
    assert_eq!(second.text, "two");
    assert!(second.timestamp >= first.timestamp);
    assert_eq!(out.text().matches("Message sent.").count(), 2);
}

#[tokio::test]
async fn exit_keyword_sends_nothing() {
    for keyword in ["exit", "Exit", "  EXIT  "] {
        let hub = MemoryHub::new();
        let session = Session::establish(
            plan(None, Some(BOB)),
            &resolver(),
            hub.signal(Consensus::messages(CHANNEL)),
            console().1,
        )
        .await
        .unwrap();

        let input = format!("{keyword}\nnever sent\n");
        let outcome = session
            .run(input.as_bytes(), std::future::pending())
            .await;
        assert_eq!(outcome, SessionOutcome::ExitKeyword, "{keyword:?}");
    }
}

#[tokio::test]
async fn listen_only_reports_missing_outbound() {
    let (out, console) = console();
    let session = Session::establish(
        plan(Some(ALICE), None),
        &resolver(),
        MemoryHub::new().signal(Consensus::messages(CHANNEL)),
        console,
    )
    .await
    .unwrap();
    assert!(session.outbound().is_none());

    let outcome = session
        .run(&b"hi\nexit\n"[..], std::future::pending())
        .await;
    assert_eq!(outcome, SessionOutcome::ExitKeyword);
    assert!(out.text().contains("Listening only."));
    assert!(out.text().contains("this session only listens"));
}

fn reject_everything(_: &serde_json::Value) -> Result<(), ValidationError> {
    Err(ValidationError::NotAnObject("anything"))
}

#[tokio::test]
async fn outbound_validation_failure_is_reported() {
    let hub = MemoryHub::new();
    let (out, console) = console();
    let session = Session::establish(
        plan(None, Some(BOB)),
        &resolver(),
        hub.signal(Consensus::with_rule(CHANNEL, reject_everything)),
        console,
    )
    .await
    .unwrap();

    let outcome = session
        .run(&b"hi\nstill here\nexit\n"[..], std::future::pending())
        .await;
    assert_eq!(outcome, SessionOutcome::ExitKeyword);
    assert_eq!(out.text().matches("Error: message not sent").count(), 2);
    assert!(!out.text().contains("Message sent."));
}

#[tokio::test]
async fn invalid_inbound_payload_is_dropped() {
    let hub = MemoryHub::new();
    let (out, console) = console();
    let session = Session::establish(
        plan(Some(ALICE), None),
        &resolver(),
        hub.signal(Consensus::messages(CHANNEL)),
        console,
    )
    .await
    .unwrap();
    let own = session.inbound().unwrap().resource_id().to_hex();

    let (_keyboard, stdin) = tokio::io::duplex(64);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(session.run(tokio::io::BufReader::new(stdin), async {
        let _ = stop_rx.await;
    }));

    for payload in [
        serde_json::json!({"text": "missing timestamp"}),
        serde_json::json!({"text": "extra", "timestamp": 1, "from": "mallory"}),
        serde_json::json!({"text": "welcome", "timestamp": 2}),
    ] {
        hub.inject(Envelope {
            consensus: CHANNEL.into(),
            resource_id: own.clone(),
            stamp: None,
            payload,
        });
    }

    assert!(wait_for(&out, "Received message: welcome").await);
    assert!(!out.text().contains("missing timestamp"));
    assert!(!out.text().contains("mallory"));

    stop_tx.send(()).unwrap();
    assert_eq!(task.await.unwrap(), SessionOutcome::Interrupted);
}

#[tokio::test]
async fn listen_only_outlives_closed_input() {
    let hub = MemoryHub::new();
    let (out, console) = console();
    let session = Session::establish(
        plan(Some(ALICE), None),
        &resolver(),
        hub.signal(Consensus::messages(CHANNEL)),
        console,
    )
    .await
    .unwrap();
    let own = session.inbound().unwrap().resource_id().to_hex();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(session.run(&b""[..], async {
        let _ = stop_rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!task.is_finished());

    hub.inject(Envelope {
        consensus: CHANNEL.into(),
        resource_id: own,
        stamp: None,
        payload: serde_json::json!({"text": "still there?", "timestamp": 3}),
    });
    assert!(wait_for(&out, "Received message: still there?").await);
    assert!(!out.text().contains("Exiting..."));

    stop_tx.send(()).unwrap();
    assert_eq!(task.await.unwrap(), SessionOutcome::Interrupted);
}

/// Memory signal whose first `failures` writes are refused.
struct FlakySignal {
    inner: MemorySignal,
    failures: AtomicUsize,
}

#[async_trait]
impl SignalChannel for FlakySignal {
    fn consensus(&self) -> &Consensus {
        self.inner.consensus()
    }

    async fn write(
        &self,
        payload: &serde_json::Value,
        resource_id: &ResourceId,
    ) -> murmur_signal::Result<SentReceipt> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(SignalError::Closed);
        }
        self.inner.write(payload, resource_id).await
    }

    async fn subscribe(&self, resource_id: ResourceId) -> murmur_signal::Result<Subscription> {
        self.inner.subscribe(resource_id).await
    }
}

#[tokio::test]
async fn transmission_failure_is_reported_and_session_continues() {
    let hub = MemoryHub::new();
    let (out, console) = console();
    let signal = FlakySignal {
        inner: hub.signal(Consensus::messages(CHANNEL)),
        failures: AtomicUsize::new(1),
    };
    let session = Session::establish(plan(None, Some(BOB)), &resolver(), signal, console)
        .await
        .unwrap();

    let remote = *session.outbound().unwrap().resource_id();
    let mut observer = hub
        .signal(Consensus::messages(CHANNEL))
        .subscribe(remote)
        .await
        .unwrap();

    let outcome = session
        .run(&b"lost
second try
exit
"[..], std::future::pending())
        .await;
    assert_eq!(outcome, SessionOutcome::ExitKeyword);

    let text = out.text();
    let failed = text
        .find("Error: failed to send message")
        .expect("transmission error reported");
    let after = &text[failed..];
    let line_end = after.find('\n').unwrap();
    assert!(after[line_end + 1..].starts_with(PROMPT));
    assert_eq!(text.matches("Message sent.").count(), 1);

    let delivered = observer.next().await.unwrap().unwrap();
    assert_eq!(delivered.text, "second try");
}
