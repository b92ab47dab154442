//! Background monitoring jobs.
//!
//! Each state that watches the reader owns one job, spawned as its own task.
//! A job never touches the state machine: it posts a single outcome into the
//! engine queue, tagged with the generation it was armed with, and ends.
//!
//! ```text
//!   state entered ──► ActiveJob::spawn ──► run ──► Message::Job { generation, outcome }
//!                          │                                  │
//!   state left ───► ActiveJob::stop (cancel, abort, join)     ▼
//!                                                   worker drops stale generations
//! ```

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use cardwatch_hardware::{CardReader, HardwareError, ReaderCapabilities};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::engine::Message;
use crate::state::{InternalEvent, MonitoringState};

/// Way a state watches the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringJob {
    /// Blocking native wait for a card to appear.
    NativeInsertion,

    /// Presence pings until a card appears.
    PollingInsertion,

    /// Blocking native wait for the card to leave.
    NativeRemoval,

    /// Presence pings until the card is gone.
    PollingRemoval,

    /// No detection, only the phase deadline.
    Watchdog,
}

impl MonitoringJob {
    /// Event posted when the job detects what it waits for.
    fn detects(&self) -> Option<InternalEvent> {
        match self {
            MonitoringJob::NativeInsertion | MonitoringJob::PollingInsertion => {
                Some(InternalEvent::SeInserted)
            }
            MonitoringJob::NativeRemoval | MonitoringJob::PollingRemoval => {
                Some(InternalEvent::SeRemoved)
            }
            MonitoringJob::Watchdog => None,
        }
    }
}

/// Per-state job selection, resolved once from the reader capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTable {
    insertion: MonitoringJob,
    processing: MonitoringJob,
    removal: MonitoringJob,
}

impl JobTable {
    /// Prefer native waits, fall back to polling.
    ///
    /// Processing never polls: the application is talking to the card, so a
    /// removal can only be detected natively; otherwise only the deadline is
    /// watched.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardwatch_hardware::ReaderCapabilities;
    /// use cardwatch_observer::job::{JobTable, MonitoringJob};
    /// use cardwatch_observer::MonitoringState;
    ///
    /// let table = JobTable::resolve(ReaderCapabilities::ping_only());
    /// assert_eq!(
    ///     table.job_for(MonitoringState::AwaitingInsertion),
    ///     Some(MonitoringJob::PollingInsertion)
    /// );
    /// assert_eq!(table.job_for(MonitoringState::Processing), Some(MonitoringJob::Watchdog));
    /// assert_eq!(table.job_for(MonitoringState::AwaitingStart), None);
    /// ```
    pub fn resolve(capabilities: ReaderCapabilities) -> Self {
        let insertion = if capabilities.smart_insertion {
            MonitoringJob::NativeInsertion
        } else {
            MonitoringJob::PollingInsertion
        };

        let (processing, removal) = if capabilities.smart_removal {
            (MonitoringJob::NativeRemoval, MonitoringJob::NativeRemoval)
        } else {
            (MonitoringJob::Watchdog, MonitoringJob::PollingRemoval)
        };

        Self {
            insertion,
            processing,
            removal,
        }
    }

    /// Job owned by `state`, if any.
    pub fn job_for(&self, state: MonitoringState) -> Option<MonitoringJob> {
        match state {
            MonitoringState::AwaitingStart => None,
            MonitoringState::AwaitingInsertion => Some(self.insertion),
            MonitoringState::Processing => Some(self.processing),
            MonitoringState::AwaitingRemoval => Some(self.removal),
        }
    }
}

/// How a job ended.
#[derive(Debug)]
pub(crate) enum JobOutcome {
    /// The awaited condition happened, or the deadline expired (`TimeOut`).
    Detected(InternalEvent),

    /// Cancelled before anything happened.
    Interrupted,

    /// The reader could not be reached.
    Failed(HardwareError),
}

/// Timing parameters of one job run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JobTiming {
    pub(crate) deadline: Option<Duration>,
    pub(crate) ping_interval: Duration,
}

/// Handle on the job owned by the current state.
pub(crate) struct ActiveJob {
    kind: MonitoringJob,
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveJob {
    /// Spawn `kind` on the current runtime.
    pub(crate) fn spawn<R: CardReader>(
        kind: MonitoringJob,
        generation: u64,
        reader: Arc<R>,
        timing: JobTiming,
        queue: mpsc::UnboundedSender<Message>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let outcome = run(kind, reader.as_ref(), timing, &token).await;
            trace!(reader = reader.name(), job = ?kind, generation, ?outcome, "Job ended");

            if matches!(outcome, JobOutcome::Interrupted) {
                return;
            }
            // The engine may already be gone.
            let _ = queue.send(Message::Job {
                generation,
                outcome,
            });
        });

        Self {
            kind,
            generation,
            cancel,
            handle,
        }
    }

    pub(crate) fn kind(&self) -> MonitoringJob {
        self.kind
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel the job and wait until its task is gone.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();

        match self.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(job = ?self.kind, "Monitoring job panicked: {}", e),
        }
    }
}

/// Run one job to completion.
pub(crate) async fn run<R: CardReader>(
    kind: MonitoringJob,
    reader: &R,
    timing: JobTiming,
    cancel: &CancellationToken,
) -> JobOutcome {
    match kind {
        MonitoringJob::NativeInsertion => {
            native_wait(reader, true, timing.deadline, cancel).await
        }
        MonitoringJob::NativeRemoval => native_wait(reader, false, timing.deadline, cancel).await,
        MonitoringJob::PollingInsertion | MonitoringJob::PollingRemoval => {
            let wanted = kind.detects() == Some(InternalEvent::SeInserted);
            poll(reader, wanted, timing, cancel).await
        }
        MonitoringJob::Watchdog => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => JobOutcome::Interrupted,
                _ = expire(timing.deadline) => JobOutcome::Detected(InternalEvent::TimeOut),
            }
        }
    }
}

/// Race a native capability call against the deadline and the token.
///
/// The reader gets no timeout of its own: the phase deadline is enforced
/// here, so that it always surfaces as `TimeOut`.
async fn native_wait<R: CardReader>(
    reader: &R,
    present: bool,
    deadline: Option<Duration>,
    cancel: &CancellationToken,
) -> JobOutcome {
    let detected = if present {
        InternalEvent::SeInserted
    } else {
        InternalEvent::SeRemoved
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => JobOutcome::Interrupted,
        _ = expire(deadline) => JobOutcome::Detected(InternalEvent::TimeOut),
        result = wait_for_presence(reader, present, cancel) => match result {
            Ok(true) => JobOutcome::Detected(detected),
            Ok(false) => JobOutcome::Interrupted,
            Err(e) => JobOutcome::Failed(e),
        },
    }
}

async fn wait_for_presence<R: CardReader>(
    reader: &R,
    present: bool,
    cancel: &CancellationToken,
) -> cardwatch_hardware::Result<bool> {
    if present {
        reader.wait_for_card_present(None, cancel).await
    } else {
        reader.wait_for_card_absent_native(None, cancel).await
    }
}

/// Ping until presence equals `wanted`.
///
/// The deadline is checked after each ping, and cancellation interrupts the
/// sleep between two pings.
async fn poll<R: CardReader>(
    reader: &R,
    wanted: bool,
    timing: JobTiming,
    cancel: &CancellationToken,
) -> JobOutcome {
    let detected = if wanted {
        InternalEvent::SeInserted
    } else {
        InternalEvent::SeRemoved
    };
    let expiry = expire(timing.deadline);
    tokio::pin!(expiry);

    loop {
        match reader.is_card_present_ping().await {
            Ok(present) if present == wanted => return JobOutcome::Detected(detected),
            Ok(_) => {}
            Err(e) => return JobOutcome::Failed(e),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return JobOutcome::Interrupted,
            _ = &mut expiry => return JobOutcome::Detected(InternalEvent::TimeOut),
            _ = sleep(timing.ping_interval) => {}
        }
    }
}

async fn expire(deadline: Option<Duration>) {
    match deadline {
        Some(duration) => sleep(duration).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwatch_hardware::mock::MockReader;
    use rstest::rstest;

    fn timing(deadline_ms: Option<u64>) -> JobTiming {
        JobTiming {
            deadline: deadline_ms.map(Duration::from_millis),
            ping_interval: Duration::from_millis(10),
        }
    }

    #[rstest]
    #[case(ReaderCapabilities::native(), MonitoringJob::NativeInsertion, MonitoringJob::NativeRemoval, MonitoringJob::NativeRemoval)]
    #[case(ReaderCapabilities::ping_only(), MonitoringJob::PollingInsertion, MonitoringJob::Watchdog, MonitoringJob::PollingRemoval)]
    #[case(ReaderCapabilities::ping_only().with_smart_insertion(true), MonitoringJob::NativeInsertion, MonitoringJob::Watchdog, MonitoringJob::PollingRemoval)]
    #[case(ReaderCapabilities::ping_only().with_smart_removal(true), MonitoringJob::PollingInsertion, MonitoringJob::NativeRemoval, MonitoringJob::NativeRemoval)]
    fn test_job_table(
        #[case] capabilities: ReaderCapabilities,
        #[case] insertion: MonitoringJob,
        #[case] processing: MonitoringJob,
        #[case] removal: MonitoringJob,
    ) {
        let table = JobTable::resolve(capabilities);

        assert_eq!(table.job_for(MonitoringState::AwaitingStart), None);
        assert_eq!(table.job_for(MonitoringState::AwaitingInsertion), Some(insertion));
        assert_eq!(table.job_for(MonitoringState::Processing), Some(processing));
        assert_eq!(table.job_for(MonitoringState::AwaitingRemoval), Some(removal));
    }

    #[tokio::test]
    async fn test_native_insertion_detects() {
        let (reader, handle) = MockReader::new();
        let cancel = CancellationToken::new();
        handle.insert_card();

        let outcome = run(MonitoringJob::NativeInsertion, &reader, timing(Some(1_000)), &cancel).await;
        assert!(matches!(outcome, JobOutcome::Detected(InternalEvent::SeInserted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_removal_deadline() {
        let (reader, handle) = MockReader::new();
        let cancel = CancellationToken::new();
        handle.insert_card();

        let outcome = run(MonitoringJob::NativeRemoval, &reader, timing(Some(500)), &cancel).await;
        assert!(matches!(outcome, JobOutcome::Detected(InternalEvent::TimeOut)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_removal_detects() {
        let (reader, handle) =
            MockReader::with_capabilities("Ping Reader", ReaderCapabilities::ping_only());
        let cancel = CancellationToken::new();
        handle.insert_card();

        let remover = handle.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(55)).await;
            remover.remove_card();
        });

        let outcome = run(MonitoringJob::PollingRemoval, &reader, timing(None), &cancel).await;
        assert!(matches!(outcome, JobOutcome::Detected(InternalEvent::SeRemoved)));
        assert!(handle.ping_count() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_insertion_deadline() {
        let (reader, _handle) =
            MockReader::with_capabilities("Ping Reader", ReaderCapabilities::ping_only());
        let cancel = CancellationToken::new();

        let outcome =
            run(MonitoringJob::PollingInsertion, &reader, timing(Some(100)), &cancel).await;
        assert!(matches!(outcome, JobOutcome::Detected(InternalEvent::TimeOut)));
    }

    #[tokio::test]
    async fn test_polling_failure() {
        let (reader, handle) =
            MockReader::with_capabilities("Ping Reader", ReaderCapabilities::ping_only());
        let cancel = CancellationToken::new();
        handle.fail_with("reader unplugged");

        let outcome = run(MonitoringJob::PollingInsertion, &reader, timing(None), &cancel).await;
        assert!(matches!(outcome, JobOutcome::Failed(HardwareError::CommunicationError { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog() {
        let (reader, _handle) = MockReader::new();
        let cancel = CancellationToken::new();

        let outcome = run(MonitoringJob::Watchdog, &reader, timing(Some(200)), &cancel).await;
        assert!(matches!(outcome, JobOutcome::Detected(InternalEvent::TimeOut)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts() {
        let (reader, _handle) = MockReader::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        for kind in [
            MonitoringJob::NativeInsertion,
            MonitoringJob::PollingInsertion,
            MonitoringJob::Watchdog,
        ] {
            let outcome = run(kind, &reader, timing(None), &cancel).await;
            assert!(matches!(outcome, JobOutcome::Interrupted), "{kind:?}");
        }
    }

    #[tokio::test]
    async fn test_active_job_posts_tagged_outcome() {
        let (reader, handle) = MockReader::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.insert_card();

        let job = ActiveJob::spawn(
            MonitoringJob::NativeInsertion,
            7,
            Arc::new(reader),
            timing(None),
            tx,
        );
        assert_eq!(job.kind(), MonitoringJob::NativeInsertion);
        assert_eq!(job.generation(), 7);

        let message = rx.recv().await.unwrap();
        assert!(matches!(
            message,
            Message::Job {
                generation: 7,
                outcome: JobOutcome::Detected(InternalEvent::SeInserted)
            }
        ));
        job.stop().await;
    }

    #[tokio::test]
    async fn test_stopped_job_posts_nothing() {
        let (reader, handle) = MockReader::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.insert_card();

        let job = ActiveJob::spawn(
            MonitoringJob::NativeRemoval,
            1,
            Arc::new(reader),
            timing(None),
            tx,
        );
        job.stop().await;

        assert!(rx.try_recv().is_err());
    }
}
