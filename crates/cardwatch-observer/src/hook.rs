//! Application hook invoked around the life of an inserted card.

use std::future::Future;

use crate::event::InsertionOutcome;

/// Callbacks through which the application decides what an inserted card
/// means and releases it when the engine is done with it.
///
/// Each call runs in its own task and the monitoring worker waits for it:
/// while a hook executes, no other event of this reader is processed, and
/// disposal of the engine waits for it to return.
///
/// # Examples
///
/// ```
/// use cardwatch_observer::{InsertionOutcome, SelectionHook};
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
/// ```
pub trait SelectionHook: Send + Sync + 'static {
    /// Called once per insertion. Performs the application selection (out of
    /// scope of the engine) and says whether the card is of interest.
    fn on_card_inserted(&self) -> impl Future<Output = InsertionOutcome> + Send;

    /// Called when the logical interaction with the card is over, right
    /// before `SeRemoved` is emitted. Releases logical and physical channels.
    fn on_card_closed(&self) -> impl Future<Output = ()> + Send;
}
