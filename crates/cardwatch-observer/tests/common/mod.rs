//! Common test utilities for the observation engine integration tests.
//!
//! - `observe` builds an engine around a [`MockReader`] with short timings
//! - [`Recorder`] is an observer that keeps every event and forwards it to a
//!   channel the test can await
//! - [`ScriptedHook`] answers insertions with a fixed outcome and counts calls
//!
//! Every wait is bounded by [`WAIT`] so a broken engine fails the test
//! instead of hanging it.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use cardwatch_hardware::ReaderCapabilities;
use cardwatch_hardware::mock::{MockReader, MockReaderHandle};
use cardwatch_observer::{
    InsertionOutcome, MonitoringState, ObservableReader, ObservationConfig, ReaderEvent,
    ReaderEventKind, ReaderObserver, SelectionHook, SelectionResult,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// Upper bound for anything a test waits for.
pub const WAIT: Duration = Duration::from_secs(2);

/// Window during which a test expects nothing to happen.
pub const QUIET: Duration = Duration::from_millis(150);

/// Selection payload returned by matching hooks.
pub const SELECT_RESPONSE: &[u8] = b"\x6F\x10\x84\x08\xA0\x00\x00\x04\x04\x01\x25\x09\x90\x00";

pub type Engine = ObservableReader<MockReader, ScriptedHook>;

static TRACING: Once = Once::new();

/// Route engine logs to the test output. `RUST_LOG` selects the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cardwatch_observer=debug")),
            )
            .with_test_writer()
            .init();
    });
}

/// Fast timings: 5 ms pings, generous phase deadlines.
pub fn fast_config() -> ObservationConfig {
    ObservationConfig::default()
        .with_ping_interval_ms(5)
        .with_insertion_timeout_ms(5_000)
        .with_removal_timeout_ms(5_000)
}

/// Build an engine around a fresh mock reader.
pub fn observe(
    capabilities: ReaderCapabilities,
    hook: Arc<ScriptedHook>,
    config: ObservationConfig,
) -> (Engine, MockReaderHandle) {
    init_tracing();

    let (reader, handle) = MockReader::with_capabilities("Test Reader", capabilities);
    let engine = ObservableReader::new(Arc::new(reader), hook, config).unwrap();
    (engine, handle)
}

/// Observer keeping every event it receives.
pub struct Recorder {
    events: Mutex<Vec<ReaderEvent>>,
    tx: mpsc::UnboundedSender<ReaderEvent>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ReaderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Self {
            events: Mutex::new(Vec::new()),
            tx,
        });
        (recorder, rx)
    }

    pub fn kinds(&self) -> Vec<ReaderEventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.kind)
            .collect()
    }

    pub fn count(&self, kind: ReaderEventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

impl ReaderObserver for Recorder {
    fn update(&self, event: &ReaderEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Selection hook with a fixed answer.
pub struct ScriptedHook {
    outcome: InsertionOutcome,
    select_delay: Duration,
    close_delay: Duration,
    inserted: AtomicUsize,
    closed: AtomicUsize,
}

impl ScriptedHook {
    pub fn new(outcome: InsertionOutcome) -> Arc<Self> {
        Self::slow(outcome, Duration::ZERO, Duration::ZERO)
    }

    /// Hook whose calls take a while to return.
    pub fn slow(
        outcome: InsertionOutcome,
        select_delay: Duration,
        close_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            select_delay,
            close_delay,
            inserted: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        })
    }

    /// Every card matches the application selection.
    pub fn matching() -> Arc<Self> {
        Self::new(InsertionOutcome::Matched(SelectionResult::new(SELECT_RESPONSE)))
    }

    /// No card is of interest.
    pub fn ignoring() -> Arc<Self> {
        Self::new(InsertionOutcome::Ignored)
    }

    pub fn inserted_calls(&self) -> usize {
        self.inserted.load(Ordering::SeqCst)
    }

    pub fn closed_calls(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SelectionHook for ScriptedHook {
    async fn on_card_inserted(&self) -> InsertionOutcome {
        self.inserted.fetch_add(1, Ordering::SeqCst);
        sleep(self.select_delay).await;
        self.outcome.clone()
    }

    async fn on_card_closed(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        sleep(self.close_delay).await;
    }
}

/// Next event delivered to a [`Recorder`].
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ReaderEvent>) -> ReaderEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("Timed out waiting for a reader event")
        .expect("Recorder dropped")
}

/// Next event, which must be of `kind`.
pub async fn expect_event(
    rx: &mut mpsc::UnboundedReceiver<ReaderEvent>,
    kind: ReaderEventKind,
) -> ReaderEvent {
    let event = next_event(rx).await;
    assert_eq!(event.kind, kind, "unexpected event {:?}", event);
    event
}

/// Assert that no event arrives for [`QUIET`].
pub async fn expect_quiet(rx: &mut mpsc::UnboundedReceiver<ReaderEvent>) {
    if let Ok(Some(event)) = timeout(QUIET, rx.recv()).await {
        panic!("unexpected event {:?}", event);
    }
}

/// Wait until the engine reaches `state`.
pub async fn wait_state(engine: &Engine, state: MonitoringState) {
    let mut states = engine.subscribe_state();
    timeout(WAIT, states.wait_for(|current| *current == state))
        .await
        .unwrap_or_else(|_| {
            panic!(
                "Timed out waiting for {}, engine is {}",
                state,
                engine.monitoring_state()
            )
        })
        .expect("State channel closed");
}
