//! Monitoring worker and event dispatch.
//!
//! Every input of the state machine, whether an application command or a job
//! outcome, goes through one unbounded queue. A single worker task drains it
//! and applies transitions strictly one at a time, so the state is never
//! mutated concurrently while jobs block or poll in their own tasks.
//!
//! ```text
//!   start_detection ─┐
//!   stop_detection ──┼──► mpsc queue ──► worker ──► next_step ──► apply
//!   processing_done ─┤                                             │
//!   job outcomes ────┘                        observers ◄── notify ┤
//!                                             job task  ◄── arm ───┘
//! ```

use std::sync::Arc;

use cardwatch_core::PollingMode;
use cardwatch_hardware::CardReader;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::config::ObservationConfig;
use crate::error::ObservationError;
use crate::event::{InsertionOutcome, ReaderEvent, ReaderEventKind, SelectionResult};
use crate::hook::SelectionHook;
use crate::job::{ActiveJob, JobOutcome, JobTable, JobTiming};
use crate::observer::Notifier;
use crate::state::{
    Effect, InternalEvent, MonitoringState, Step, Transition, TransitionContext, after_selection,
    next_step,
};

/// Application request, queued until the worker picks it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    StartDetection(PollingMode),
    StopDetection,
    ProcessingDone,
}

/// Entry of the engine queue.
#[derive(Debug)]
pub(crate) enum Message {
    Command(Command),
    Job { generation: u64, outcome: JobOutcome },
}

type Report = Option<(ReaderEventKind, Option<SelectionResult>)>;

/// Everything the worker owns while it runs.
pub(crate) struct EngineCore<R, H> {
    reader: Arc<R>,
    hook: Arc<H>,
    config: ObservationConfig,
    jobs: JobTable,
    queue_tx: mpsc::UnboundedSender<Message>,
    queue_rx: mpsc::UnboundedReceiver<Message>,
    state: watch::Sender<MonitoringState>,
    mode: watch::Sender<PollingMode>,
    notifier: Notifier,
    active: Option<ActiveJob>,
    generation: u64,
    insertion_timeouts: u32,
}

impl<R: CardReader, H: SelectionHook> EngineCore<R, H> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        reader: Arc<R>,
        hook: Arc<H>,
        config: ObservationConfig,
        queue_tx: mpsc::UnboundedSender<Message>,
        queue_rx: mpsc::UnboundedReceiver<Message>,
        state: watch::Sender<MonitoringState>,
        mode: watch::Sender<PollingMode>,
        notifier: Notifier,
    ) -> Self {
        let jobs = JobTable::resolve(reader.capabilities());

        Self {
            reader,
            hook,
            config,
            jobs,
            queue_tx,
            queue_rx,
            state,
            mode,
            notifier,
            active: None,
            generation: 0,
            insertion_timeouts: 0,
        }
    }

    fn name(&self) -> &str {
        self.reader.name()
    }

    fn current(&self) -> MonitoringState {
        *self.state.borrow()
    }

    async fn handle(&mut self, message: Message) {
        let event = match message {
            Message::Command(command) => Some(self.command_event(command)),
            Message::Job {
                generation,
                outcome,
            } => self.job_event(generation, outcome),
        };

        if let Some(event) = event {
            self.dispatch(event).await;
        }
    }

    fn command_event(&mut self, command: Command) -> InternalEvent {
        match command {
            Command::StartDetection(mode) => {
                // Latched only while idle; later calls hit an ignored pair.
                if self.current() == MonitoringState::AwaitingStart {
                    self.mode.send_replace(mode);
                }
                InternalEvent::StartDetect
            }
            Command::StopDetection => InternalEvent::StopDetect,
            Command::ProcessingDone => InternalEvent::SeProcessed,
        }
    }

    fn job_event(&mut self, generation: u64, outcome: JobOutcome) -> Option<InternalEvent> {
        if self.active.as_ref().map(ActiveJob::generation) != Some(generation) {
            trace!(reader = self.name(), generation, "Stale job outcome discarded");
            return None;
        }

        let state = self.current();
        match outcome {
            JobOutcome::Detected(event) => Some(event),
            JobOutcome::Interrupted => None,
            JobOutcome::Failed(e) => {
                warn!(reader = self.name(), %state, "Reader communication failed: {}", e);
                self.notifier.report(ObservationError::Communication {
                    state,
                    message: e.to_string(),
                });
                Some(InternalEvent::StopDetect)
            }
        }
    }

    async fn dispatch(&mut self, event: InternalEvent) {
        let state = self.current();
        trace!(reader = self.name(), %state, %event, "Event received");

        if state == MonitoringState::AwaitingInsertion && event == InternalEvent::TimeOut {
            self.insertion_timeouts = self.insertion_timeouts.saturating_add(1);
        }

        let ctx = TransitionContext {
            polling_mode: *self.mode.borrow(),
            insertion_retries_exhausted: self
                .config
                .insertion_retry_limit
                .is_some_and(|limit| self.insertion_timeouts >= limit),
        };

        let (transition, report) = match next_step(state, event, &ctx) {
            Step::Ignore => {
                warn!(reader = self.name(), %state, %event, "Event ignored in this state");
                return;
            }
            Step::Select => {
                let outcome = self.select().await;
                (after_selection(outcome.is_matched()), outcome.into_report())
            }
            Step::Apply(transition) => (transition, None),
        };

        self.apply(transition, report).await;
    }

    async fn apply(&mut self, transition: Transition, report: Report) {
        let Transition { from, to, effect } = transition;

        self.deactivate_job().await;

        if effect == Effect::CloseAndNotifyRemoved {
            self.close_card().await;
        }

        let rearm = from == MonitoringState::AwaitingInsertion && to == from;
        if rearm {
            debug!(reader = self.name(), timeouts = self.insertion_timeouts, "Insertion job re-armed");
        } else {
            self.insertion_timeouts = 0;
            debug!(reader = self.name(), %from, %to, ?effect, "State transition");
        }
        self.state.send_replace(to);

        match effect {
            Effect::None => {}
            Effect::NotifyAwaitingStart => self.emit(ReaderEventKind::AwaitingStartDetection, None),
            Effect::ReportSelection => {
                if let Some((kind, selection)) = report {
                    self.emit(kind, selection);
                }
            }
            Effect::CloseAndNotifyRemoved => self.emit(ReaderEventKind::SeRemoved, None),
            Effect::NotifyTimeout => {
                warn!(reader = self.name(), state = %from, "Deadline exceeded");
                self.notifier
                    .report(ObservationError::Deadline { state: from });
                self.emit(ReaderEventKind::TimeoutError, None);
            }
        }

        self.activate_job(to);
    }

    fn emit(&self, kind: ReaderEventKind, selection: Option<SelectionResult>) {
        let event = ReaderEvent::new(self.name(), kind).with_selection(selection);
        self.notifier.notify(&event);
    }

    /// Ask the application whether the inserted card is of interest.
    ///
    /// A panicking hook counts as "not of interest".
    async fn select(&self) -> InsertionOutcome {
        let hook = Arc::clone(&self.hook);

        match tokio::spawn(async move { hook.on_card_inserted().await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(reader = self.name(), "Selection hook failed: {}", e);
                InsertionOutcome::Ignored
            }
        }
    }

    async fn close_card(&self) {
        let hook = Arc::clone(&self.hook);

        if let Err(e) = tokio::spawn(async move { hook.on_card_closed().await }).await {
            error!(reader = self.name(), "Close hook failed: {}", e);
        }
    }

    fn activate_job(&mut self, state: MonitoringState) {
        let Some(kind) = self.jobs.job_for(state) else {
            return;
        };

        self.generation += 1;
        let timing = JobTiming {
            deadline: self.config.deadline_for(state),
            ping_interval: self.config.ping_interval(),
        };

        trace!(reader = self.name(), job = ?kind, generation = self.generation, "Job armed");
        self.active = Some(ActiveJob::spawn(
            kind,
            self.generation,
            Arc::clone(&self.reader),
            timing,
            self.queue_tx.clone(),
        ));
    }

    async fn deactivate_job(&mut self) {
        if let Some(job) = self.active.take() {
            trace!(reader = self.name(), job = ?job.kind(), "Job cancelled");
            job.stop().await;
        }
    }

    /// Stop the current job and go back to idle without notifying anyone.
    ///
    /// A card still being processed is released through the hook.
    async fn dispose(&mut self) {
        self.deactivate_job().await;

        let state = self.current();
        if state == MonitoringState::Processing {
            self.close_card().await;
        }

        self.insertion_timeouts = 0;
        if state != MonitoringState::AwaitingStart {
            debug!(reader = self.name(), %state, "Monitoring reset");
            self.state.send_replace(MonitoringState::AwaitingStart);
        }
    }
}

/// Worker body: drain the queue until `shutdown` fires, then dispose.
///
/// `shutdown` is only observed between messages. Jobs honour cancellation
/// on their own, so the only wait left inside a message is a hook call.
///
/// The core lock is held for the whole run, so a worker started while the
/// previous one is still disposing waits for it.
pub(crate) async fn run_worker<R: CardReader, H: SelectionHook>(
    core: Arc<Mutex<EngineCore<R, H>>>,
    shutdown: CancellationToken,
) {
    let mut core = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        core = core.lock_owned() => core,
    };
    debug!(reader = core.name(), "Monitoring worker started");

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = core.queue_rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        // Never cut short: a hook call in flight must land in the state
        // before disposal decides whether a card is still open.
        core.handle(message).await;
    }

    core.dispose().await;
    debug!(reader = core.name(), "Monitoring worker stopped");
}
