//! Public face of the observation engine.

use std::sync::{Arc, Mutex, MutexGuard};

use cardwatch_core::{Error, ObserverId, PollingMode, Result};
use cardwatch_hardware::CardReader;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::ObservationConfig;
use crate::engine::{Command, EngineCore, Message, run_worker};
use crate::error::ObservationError;
use crate::hook::SelectionHook;
use crate::observer::{Notifier, ObserverSet, ReaderObserver};
use crate::state::MonitoringState;

/// A card reader watched for secure element insertions and removals.
///
/// Commands are queued and applied in order by a background worker, which
/// runs only while at least one observer is registered. Commands issued
/// while no observer is registered wait in the queue.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cardwatch_core::PollingMode;
/// use cardwatch_hardware::mock::MockReader;
/// use cardwatch_observer::{
///     InsertionOutcome, MonitoringState, ObservableReader, ObservationConfig, ReaderEvent,
///     SelectionHook,
/// };
///
/// struct AcceptAll;
///
/// impl SelectionHook for AcceptAll {
///     async fn on_card_inserted(&self) -> InsertionOutcome {
///         InsertionOutcome::Inserted(None)
///     }
///
///     async fn on_card_closed(&self) {}
/// }
///
/// #[tokio::main]
/// async fn main() -> cardwatch_core::Result<()> {
///     let (reader, handle) = MockReader::new();
///     let observable =
///         ObservableReader::new(Arc::new(reader), Arc::new(AcceptAll), ObservationConfig::default())?;
///
///     let observer = observable.add_observer(Arc::new(|event: &ReaderEvent| -> anyhow::Result<()> {
///         println!("{}: {}", event.reader_name, event.kind);
///         Ok(())
///     }))?;
///
///     let mut state = observable.subscribe_state();
///     observable.start_detection(PollingMode::Continue);
///     handle.insert_card();
///     state
///         .wait_for(|state| *state == MonitoringState::Processing)
///         .await
///         .unwrap();
///
///     observable.remove_observer(observer).await;
///     Ok(())
/// }
/// ```
pub struct ObservableReader<R: CardReader, H: SelectionHook> {
    name: String,
    queue: mpsc::UnboundedSender<Message>,
    core: Arc<tokio::sync::Mutex<EngineCore<R, H>>>,
    observers: Arc<ObserverSet>,
    worker: Mutex<Option<Worker>>,
    state: watch::Receiver<MonitoringState>,
    mode: watch::Receiver<PollingMode>,
    errors: broadcast::Sender<ObservationError>,
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    async fn stop(self) {
        self.shutdown.cancel();

        if let Err(e) = self.handle.await {
            warn!("Monitoring worker ended abnormally: {}", e);
        }
    }
}

impl<R: CardReader, H: SelectionHook> ObservableReader<R, H> {
    /// Wrap `reader`, validating `config` and resolving the job table from
    /// the reader capabilities.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(reader: Arc<R>, hook: Arc<H>, config: ObservationConfig) -> Result<Self> {
        config.validate()?;

        let name = reader.name().to_string();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(MonitoringState::AwaitingStart);
        let (mode_tx, mode_rx) = watch::channel(PollingMode::default());
        let (errors, _) = broadcast::channel(config.error_channel_capacity);
        let observers = Arc::new(ObserverSet::default());

        debug!(
            reader = %name,
            capabilities = ?reader.capabilities(),
            "Observable reader created"
        );

        let core = EngineCore::new(
            reader,
            hook,
            config,
            queue_tx.clone(),
            queue_rx,
            state_tx,
            mode_tx,
            Notifier::new(Arc::clone(&observers), errors.clone()),
        );

        Ok(Self {
            name,
            queue: queue_tx,
            core: Arc::new(tokio::sync::Mutex::new(core)),
            observers,
            worker: Mutex::new(None),
            state: state_rx,
            mode: mode_rx,
            errors,
        })
    }

    /// Reader name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start watching the reader. `mode` is latched only if detection is
    /// not already running.
    pub fn start_detection(&self, mode: PollingMode) {
        self.send(Command::StartDetection(mode));
    }

    /// Stop watching the reader and go back to idle.
    pub fn stop_detection(&self) {
        self.send(Command::StopDetection);
    }

    /// Signal that the application is done with the current card.
    pub fn notify_processing_done(&self) {
        self.send(Command::ProcessingDone);
    }

    fn send(&self, command: Command) {
        trace!(reader = %self.name, ?command, "Command queued");
        // The receiver lives as long as `self`.
        let _ = self.queue.send(Message::Command(command));
    }

    /// Register an observer. The first one starts the monitoring worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] if the worker has to be started outside
    /// of a tokio runtime. The observer is not registered in that case.
    pub fn add_observer(&self, observer: Arc<dyn ReaderObserver>) -> Result<ObserverId> {
        let mut worker = self.worker_slot();

        let runtime = if worker.is_none() {
            Some(Handle::try_current().map_err(|_| Error::NoRuntime)?)
        } else {
            None
        };

        let (id, count) = self.observers.insert(observer);
        debug!(reader = %self.name, observer = %id, count, "Observer added");

        if let Some(runtime) = runtime {
            let shutdown = CancellationToken::new();
            let handle = runtime.spawn(run_worker(Arc::clone(&self.core), shutdown.clone()));
            *worker = Some(Worker { shutdown, handle });
        }

        Ok(id)
    }

    /// Unregister an observer. Removing the last one stops the worker,
    /// interrupts the running job and resets the reader to
    /// [`MonitoringState::AwaitingStart`].
    ///
    /// Returns `false` if `id` was not registered.
    pub async fn remove_observer(&self, id: ObserverId) -> bool {
        let stopped = {
            let mut worker = self.worker_slot();
            let Some(remaining) = self.observers.remove(id) else {
                return false;
            };
            debug!(reader = %self.name, observer = %id, count = remaining, "Observer removed");

            if remaining == 0 { worker.take() } else { None }
        };

        if let Some(worker) = stopped {
            worker.stop().await;
        }
        true
    }

    /// Unregister every observer and stop the worker.
    pub async fn clear_observers(&self) {
        let stopped = {
            let mut worker = self.worker_slot();
            let removed = self.observers.clear();
            debug!(reader = %self.name, removed, "Observers cleared");
            worker.take()
        };

        if let Some(worker) = stopped {
            worker.stop().await;
        }
    }

    pub fn count_observers(&self) -> usize {
        self.observers.len()
    }

    /// Current monitoring state.
    pub fn monitoring_state(&self) -> MonitoringState {
        *self.state.borrow()
    }

    /// Stream of monitoring states, updated before observers are notified.
    pub fn subscribe_state(&self) -> watch::Receiver<MonitoringState> {
        self.state.clone()
    }

    /// Errors raised outside the event stream, such as a failing observer
    /// or a lost reader link.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ObservationError> {
        self.errors.subscribe()
    }

    /// Polling mode latched by the last accepted `start_detection`.
    pub fn polling_mode(&self) -> PollingMode {
        *self.mode.borrow()
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<R: CardReader, H: SelectionHook> Drop for ObservableReader<R, H> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker_slot().take() {
            worker.shutdown.cancel();
        }
    }
}
