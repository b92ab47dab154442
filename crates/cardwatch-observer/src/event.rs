//! Observer-visible reader events and selection results.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of event delivered to reader observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ReaderEventKind {
    /// Detection has been started and the reader is now watched.
    AwaitingStartDetection,

    /// A card of interest was inserted; no selection matched it explicitly.
    SeInserted,

    /// A card was inserted and the application selection matched it.
    SeMatched,

    /// The card has been released and is gone (or is about to be).
    SeRemoved,

    /// Processing or removal took longer than allowed; detection stopped.
    TimeoutError,
}

impl fmt::Display for ReaderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_str = match self {
            ReaderEventKind::AwaitingStartDetection => "AWAITING_START_DETECTION",
            ReaderEventKind::SeInserted => "SE_INSERTED",
            ReaderEventKind::SeMatched => "SE_MATCHED",
            ReaderEventKind::SeRemoved => "SE_REMOVED",
            ReaderEventKind::TimeoutError => "TIMEOUT_ERROR",
        };
        write!(f, "{}", kind_str)
    }
}

/// Opaque result of the application selection, carried unchanged to
/// observers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionResult(Bytes);

impl SelectionResult {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Answer of the selection hook for a freshly inserted card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertionOutcome {
    /// Card of interest, reported as `SeInserted`.
    Inserted(Option<SelectionResult>),

    /// Card matched the application selection, reported as `SeMatched`.
    Matched(SelectionResult),

    /// Card is not of interest. Nothing is reported; the engine waits for
    /// its removal.
    Ignored,
}

impl InsertionOutcome {
    /// Whether the engine moves on to processing.
    pub fn is_matched(&self) -> bool {
        !matches!(self, InsertionOutcome::Ignored)
    }

    /// Event kind and payload to report, if any.
    pub(crate) fn into_report(self) -> Option<(ReaderEventKind, Option<SelectionResult>)> {
        match self {
            InsertionOutcome::Inserted(selection) => Some((ReaderEventKind::SeInserted, selection)),
            InsertionOutcome::Matched(selection) => {
                Some((ReaderEventKind::SeMatched, Some(selection)))
            }
            InsertionOutcome::Ignored => None,
        }
    }
}

/// Event delivered to reader observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderEvent {
    /// Name of the reader that produced the event.
    pub reader_name: String,

    /// What happened.
    pub kind: ReaderEventKind,

    /// Selection payload for `SeInserted`/`SeMatched`.
    pub selection: Option<SelectionResult>,

    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl ReaderEvent {
    /// Create an event without selection payload, stamped now.
    pub fn new(reader_name: impl Into<String>, kind: ReaderEventKind) -> Self {
        Self {
            reader_name: reader_name.into(),
            kind,
            selection: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a selection payload.
    pub fn with_selection(mut self, selection: Option<SelectionResult>) -> Self {
        self.selection = selection;
        self
    }
}
