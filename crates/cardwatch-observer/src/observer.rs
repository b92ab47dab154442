//! Observer registry and event delivery.
//!
//! Observers are kept per reader, in registration order. Delivery happens
//! synchronously on the monitoring worker, from a snapshot of the registry,
//! so an observer may register further observers from its callback without
//! deadlocking. Removal is async and waits for the worker, so it cannot be
//! done from a callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use cardwatch_core::ObserverId;
use tokio::sync::broadcast;
use tracing::{error, trace};

use crate::error::ObservationError;
use crate::event::ReaderEvent;

/// Receiver of reader events.
///
/// Implemented for any `Fn(&ReaderEvent) -> anyhow::Result<()>` closure.
///
/// # Examples
///
/// ```
/// use cardwatch_observer::{ReaderEvent, ReaderEventKind, ReaderObserver};
///
/// let observer = |event: &ReaderEvent| -> anyhow::Result<()> {
///     if event.kind == ReaderEventKind::TimeoutError {
///         anyhow::bail!("card left in the reader too long");
///     }
///     Ok(())
/// };
///
/// let event = ReaderEvent::new("ACR122U", ReaderEventKind::SeRemoved);
/// assert!(observer.update(&event).is_ok());
/// ```
pub trait ReaderObserver: Send + Sync + 'static {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// An error is reported on the engine's error channel; it affects neither
    /// the other observers nor the state machine.
    fn update(&self, event: &ReaderEvent) -> anyhow::Result<()>;
}

impl<F> ReaderObserver for F
where
    F: Fn(&ReaderEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn update(&self, event: &ReaderEvent) -> anyhow::Result<()> {
        self(event)
    }
}

type Entry = (ObserverId, Arc<dyn ReaderObserver>);

/// Ordered set of registered observers of one reader.
#[derive(Default)]
pub(crate) struct ObserverSet {
    entries: Mutex<Vec<Entry>>,
}

impl ObserverSet {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an observer, returning its identity and the new count.
    pub(crate) fn insert(&self, observer: Arc<dyn ReaderObserver>) -> (ObserverId, usize) {
        let id = ObserverId::new();
        let mut entries = self.entries();
        entries.push((id, observer));
        (id, entries.len())
    }

    /// Unregister an observer, returning the remaining count if it was found.
    pub(crate) fn remove(&self, id: ObserverId) -> Option<usize> {
        let mut entries = self.entries();
        let index = entries.iter().position(|(entry_id, _)| *entry_id == id)?;
        entries.remove(index);
        Some(entries.len())
    }

    /// Unregister everything, returning how many observers were removed.
    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    fn snapshot(&self) -> Vec<Entry> {
        self.entries().clone()
    }
}

/// Delivers events of one reader to its observers.
pub(crate) struct Notifier {
    observers: Arc<ObserverSet>,
    errors: broadcast::Sender<ObservationError>,
}

impl Notifier {
    pub(crate) fn new(
        observers: Arc<ObserverSet>,
        errors: broadcast::Sender<ObservationError>,
    ) -> Self {
        Self { observers, errors }
    }

    /// Deliver `event` to every observer, in registration order.
    ///
    /// Returns the number of observers that accepted the event.
    pub(crate) fn notify(&self, event: &ReaderEvent) -> usize {
        let mut delivered = 0;

        for (id, observer) in self.observers.snapshot() {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| observer.update(event))) {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };

            error!(
                reader = %event.reader_name,
                observer = %id,
                kind = %event.kind,
                "Observer failed: {}",
                message
            );
            self.report(ObservationError::Observer {
                observer: id,
                message,
            });
        }

        trace!(reader = %event.reader_name, kind = %event.kind, delivered, "Event delivered");
        delivered
    }

    /// Publish a side error. Nobody listening is not an error.
    pub(crate) fn report(&self, error: ObservationError) {
        let _ = self.errors.send(error);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
