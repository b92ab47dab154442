//! Reader capability trait.
//!
//! This module defines the contract between the observation engine and a
//! concrete reader driver. The trait methods return `impl Future + Send`
//! (Rust 1.90 + Edition 2024 RPITIT) so that the engine can run them inside
//! spawned monitoring tasks; implementors can still write plain `async fn`.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{HardwareError, Result};
use crate::types::ReaderCapabilities;

/// Presence detection primitives of a card reader.
///
/// # Object Safety
///
/// Like the other async traits of this workspace this trait is NOT
/// object-safe. The observation engine is generic over `R: CardReader`.
///
/// # Optional capabilities
///
/// The two blocking waits are optional. Their default implementations return
/// [`HardwareError::Unsupported`]; a reader that overrides one of them must
/// also report it through [`CardReader::capabilities`], which is what the
/// engine consults.
///
/// # Examples
///
/// ```
/// use cardwatch_hardware::{CardReader, ReaderCapabilities, Result};
///
/// struct AlwaysEmpty;
///
/// impl CardReader for AlwaysEmpty {
///     fn name(&self) -> &str {
///         "empty"
///     }
///
///     fn capabilities(&self) -> ReaderCapabilities {
///         ReaderCapabilities::ping_only()
///     }
///
///     async fn is_card_present_ping(&self) -> Result<bool> {
///         Ok(false)
///     }
/// }
/// ```
pub trait CardReader: Send + Sync + 'static {
    /// Reader name, used as identity in events and logs.
    fn name(&self) -> &str;

    /// Native primitives this reader provides.
    fn capabilities(&self) -> ReaderCapabilities;

    /// Wait until a card is present in the reader.
    ///
    /// Returns `Ok(true)` as soon as a card is detected, `Ok(false)` when
    /// `cancel` fires or `timeout` elapses first. `None` waits until
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error on a communication failure with the reader, or
    /// [`HardwareError::Unsupported`] if the reader has no native insertion
    /// detection.
    fn wait_for_card_present(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<bool>> + Send {
        let _ = (timeout, cancel);
        async { Err(HardwareError::unsupported("wait_for_card_present")) }
    }

    /// Wait until the card currently in the reader is removed.
    ///
    /// Same return convention as [`CardReader::wait_for_card_present`].
    ///
    /// # Errors
    ///
    /// Returns an error on a communication failure with the reader, or
    /// [`HardwareError::Unsupported`] if the reader has no native removal
    /// detection.
    fn wait_for_card_absent_native(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<bool>> + Send {
        let _ = (timeout, cancel);
        async { Err(HardwareError::unsupported("wait_for_card_absent_native")) }
    }

    /// Check whether a card is present right now.
    ///
    /// Must be cheap and non-blocking: polling jobs call it every few tens of
    /// milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be reached.
    fn is_card_present_ping(&self) -> impl Future<Output = Result<bool>> + Send;
}
