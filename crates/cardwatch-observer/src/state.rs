//! Reader monitoring states and the transition table.
//!
//! This module is pure: it decides where an event leads and which side
//! effect goes with it, but it never touches hardware, observers or jobs.
//! The monitoring worker of [`ObservableReader`](crate::ObservableReader) is
//! the only caller and applies the returned [`Step`].
//!
//! # States
//!
//! - `AwaitingStart`: idle, waiting for the application to start detection
//! - `AwaitingInsertion`: an insertion job watches the reader
//! - `Processing`: the application exchanges data with the inserted card
//! - `AwaitingRemoval`: a removal job waits for the card to leave
//!
//! # Transition table
//!
//! | State | Event | Effect | Next |
//! |---|---|---|---|
//! | AwaitingStart | StartDetect | notify `AwaitingStartDetection` | AwaitingInsertion |
//! | AwaitingInsertion | SeInserted | run selection hook | Processing or AwaitingRemoval |
//! | AwaitingInsertion | StopDetect | none | AwaitingStart |
//! | AwaitingInsertion | TimeOut | none (re-arm) | AwaitingInsertion |
//! | Processing | SeProcessed | CONTINUE: none / STOP_AFTER: close, notify removal | AwaitingRemoval / AwaitingStart |
//! | Processing | SeRemoved | close, notify removal | AwaitingInsertion |
//! | Processing | StopDetect | close, notify removal | AwaitingStart |
//! | Processing | TimeOut | notify timeout | AwaitingStart |
//! | AwaitingRemoval | SeRemoved | close, notify removal | CONTINUE: AwaitingInsertion / STOP_AFTER: AwaitingStart |
//! | AwaitingRemoval | StopDetect | none | AwaitingStart |
//! | AwaitingRemoval | TimeOut | notify timeout | AwaitingStart |
//!
//! Every other pair is ignored.
//!
//! # Examples
//!
//! ```
//! use cardwatch_core::PollingMode;
//! use cardwatch_observer::state::{
//!     next_step, Effect, InternalEvent, MonitoringState, Step, TransitionContext,
//! };
//!
//! let ctx = TransitionContext::new(PollingMode::Continue);
//! let step = next_step(MonitoringState::AwaitingStart, InternalEvent::StartDetect, &ctx);
//!
//! match step {
//!     Step::Apply(transition) => {
//!         assert_eq!(transition.to, MonitoringState::AwaitingInsertion);
//!         assert_eq!(transition.effect, Effect::NotifyAwaitingStart);
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use std::fmt;

use cardwatch_core::PollingMode;
use serde::{Deserialize, Serialize};

/// Monitoring state of an observed reader.
///
/// Exactly one is active per engine at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringState {
    /// Idle, waiting for `start_detection`.
    AwaitingStart,

    /// Watching the reader for a card insertion.
    AwaitingInsertion,

    /// The application is working with the inserted card.
    Processing,

    /// Waiting for the card to be pulled out.
    AwaitingRemoval,
}

impl fmt::Display for MonitoringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            MonitoringState::AwaitingStart => "AWAITING_START",
            MonitoringState::AwaitingInsertion => "AWAITING_INSERTION",
            MonitoringState::Processing => "PROCESSING",
            MonitoringState::AwaitingRemoval => "AWAITING_REMOVAL",
        };
        write!(f, "{}", state_str)
    }
}

/// Event fed into the state machine.
///
/// Produced by an application command, by a monitoring job outcome, or by
/// a phase deadline expiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalEvent {
    StartDetect,
    StopDetect,
    SeInserted,
    SeProcessed,
    SeRemoved,
    TimeOut,
}

impl fmt::Display for InternalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event_str = match self {
            InternalEvent::StartDetect => "START_DETECT",
            InternalEvent::StopDetect => "STOP_DETECT",
            InternalEvent::SeInserted => "SE_INSERTED",
            InternalEvent::SeProcessed => "SE_PROCESSED",
            InternalEvent::SeRemoved => "SE_REMOVED",
            InternalEvent::TimeOut => "TIME_OUT",
        };
        write!(f, "{}", event_str)
    }
}

/// Side effect attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing observable.
    None,

    /// Emit `AwaitingStartDetection`.
    NotifyAwaitingStart,

    /// Emit `SeInserted` or `SeMatched` with the selection hook result.
    ReportSelection,

    /// Release the card through the hook, then emit `SeRemoved`.
    CloseAndNotifyRemoved,

    /// Emit `TimeoutError`.
    NotifyTimeout,
}

/// A resolved state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The state transitioned from.
    pub from: MonitoringState,

    /// The state transitioned to. May equal `from`: the job is re-armed.
    pub to: MonitoringState,

    /// What to do before the new state's job is armed.
    pub effect: Effect,
}

impl Transition {
    fn new(from: MonitoringState, to: MonitoringState, effect: Effect) -> Self {
        Self { from, to, effect }
    }
}

/// Decision taken for one `(state, event)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The event means nothing in this state.
    Ignore,

    /// Run the selection hook and continue with [`after_selection`].
    Select,

    /// Change state.
    Apply(Transition),
}

/// Inputs of the transition table besides the state and the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    /// Policy latched at `start_detection`.
    pub polling_mode: PollingMode,

    /// The configured insertion retry limit has been reached.
    pub insertion_retries_exhausted: bool,
}

impl TransitionContext {
    pub fn new(polling_mode: PollingMode) -> Self {
        Self {
            polling_mode,
            insertion_retries_exhausted: false,
        }
    }
}

/// Look up the transition table.
pub fn next_step(state: MonitoringState, event: InternalEvent, ctx: &TransitionContext) -> Step {
    use InternalEvent::*;
    use MonitoringState::*;

    let apply = |to, effect| Step::Apply(Transition::new(state, to, effect));

    match (state, event) {
        (AwaitingStart, StartDetect) => apply(AwaitingInsertion, Effect::NotifyAwaitingStart),

        (AwaitingInsertion, SeInserted) => Step::Select,
        (AwaitingInsertion, StopDetect) => apply(AwaitingStart, Effect::None),
        (AwaitingInsertion, TimeOut) if ctx.insertion_retries_exhausted => {
            apply(AwaitingStart, Effect::NotifyTimeout)
        }
        (AwaitingInsertion, TimeOut) => apply(AwaitingInsertion, Effect::None),

        (Processing, SeProcessed) => match ctx.polling_mode {
            PollingMode::Continue => apply(AwaitingRemoval, Effect::None),
            PollingMode::StopAfter => apply(AwaitingStart, Effect::CloseAndNotifyRemoved),
        },
        (Processing, SeRemoved) => apply(AwaitingInsertion, Effect::CloseAndNotifyRemoved),
        (Processing, StopDetect) => apply(AwaitingStart, Effect::CloseAndNotifyRemoved),
        (Processing, TimeOut) => apply(AwaitingStart, Effect::NotifyTimeout),

        (AwaitingRemoval, SeRemoved) => match ctx.polling_mode {
            PollingMode::Continue => apply(AwaitingInsertion, Effect::CloseAndNotifyRemoved),
            PollingMode::StopAfter => apply(AwaitingStart, Effect::CloseAndNotifyRemoved),
        },
        (AwaitingRemoval, StopDetect) => apply(AwaitingStart, Effect::None),
        (AwaitingRemoval, TimeOut) => apply(AwaitingStart, Effect::NotifyTimeout),

        _ => Step::Ignore,
    }
}

/// Second half of the `AwaitingInsertion + SeInserted` row, once the
/// selection hook has answered.
///
/// An element that is not of interest is never reported: the engine cannot
/// eject it, so it silently waits for its removal.
pub fn after_selection(matched: bool) -> Transition {
    if matched {
        Transition::new(
            MonitoringState::AwaitingInsertion,
            MonitoringState::Processing,
            Effect::ReportSelection,
        )
    } else {
        Transition::new(
            MonitoringState::AwaitingInsertion,
            MonitoringState::AwaitingRemoval,
            Effect::None,
        )
    }
}
