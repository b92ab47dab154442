//! Secure element reader observation engine.
//!
//! Turns the raw presence primitives of a [`CardReader`] into an ordered
//! stream of [`ReaderEvent`]s delivered to registered observers:
//!
//! ```text
//! AwaitingStart ──start_detection──► AwaitingInsertion ──card, matched──► Processing
//!       ▲                                  ▲    │                             │
//!       │                                  │    └──card, not matched──┐       │ processing done
//!       │                                  │                          ▼       ▼
//!       └───────── STOP_AFTER ─────────────┴──── CONTINUE ──────── AwaitingRemoval
//! ```
//!
//! Each reader is wrapped in an [`ObservableReader`]. The application drives
//! it with [`start_detection`](ObservableReader::start_detection),
//! [`notify_processing_done`](ObservableReader::notify_processing_done) and
//! [`stop_detection`](ObservableReader::stop_detection); a [`SelectionHook`]
//! decides what an inserted card means and releases it afterwards.
//!
//! # Monitoring strategy
//!
//! Readers declare native insertion and removal waits through
//! [`ReaderCapabilities`](cardwatch_hardware::ReaderCapabilities). Missing
//! capabilities are replaced by presence polling, except while processing
//! where only the phase deadline is watched. See [`job::JobTable`].
//!
//! # Errors
//!
//! Failures that do not belong to the event stream (a failing observer, a
//! reader I/O error, an expired deadline) are logged with `tracing` and
//! published as [`ObservationError`] on
//! [`subscribe_errors`](ObservableReader::subscribe_errors).

pub mod config;
mod engine;
pub mod error;
pub mod event;
pub mod hook;
pub mod job;
mod observable;
pub mod observer;
pub mod state;

pub use cardwatch_core::PollingMode;
pub use cardwatch_hardware::CardReader;
pub use config::ObservationConfig;
pub use error::ObservationError;
pub use event::{InsertionOutcome, ReaderEvent, ReaderEventKind, SelectionResult};
pub use hook::SelectionHook;
pub use observable::ObservableReader;
pub use observer::ReaderObserver;
pub use state::{InternalEvent, MonitoringState};
