//! Mock card reader implementation for testing and development.
//!
//! This module provides a simulated reader whose card presence and link
//! health can be driven programmatically, so the observation engine can be
//! exercised without physical hardware.

use std::future::pending;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{HardwareError, Result, traits::CardReader, types::ReaderCapabilities};

/// Mock card reader for testing and development.
///
/// Card presence is held in a `watch` channel shared with a
/// [`MockReaderHandle`]: blocking waits wake up as soon as the handle flips
/// the presence flag. A link failure can be injected through the handle;
/// while it is set every capability call fails with a communication error.
///
/// # Examples
///
/// ```
/// use cardwatch_hardware::CardReader;
/// use cardwatch_hardware::mock::MockReader;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> cardwatch_hardware::Result<()> {
///     let (reader, handle) = MockReader::new();
///     let cancel = CancellationToken::new();
///
///     handle.insert_card();
///     assert!(reader.wait_for_card_present(None, &cancel).await?);
///
///     handle.remove_card();
///     assert!(reader.wait_for_card_absent_native(None, &cancel).await?);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReader {
    /// Reader name
    name: String,

    /// Declared native capabilities
    capabilities: ReaderCapabilities,

    /// State shared with the handle
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    presence: watch::Sender<bool>,
    failure: watch::Sender<Option<String>>,
    pings: AtomicU64,
    native_waits: AtomicU64,
}

impl MockReader {
    /// Create a new mock reader with the default name and native capabilities.
    ///
    /// Returns a tuple of (MockReader, MockReaderHandle) where the handle
    /// can be used to simulate card insertion and removal.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardwatch_hardware::mock::MockReader;
    ///
    /// let (reader, handle) = MockReader::new();
    /// ```
    pub fn new() -> (Self, MockReaderHandle) {
        Self::with_capabilities("Mock Reader", ReaderCapabilities::native())
    }

    /// Create a new mock reader with a custom name and capability set.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardwatch_hardware::ReaderCapabilities;
    /// use cardwatch_hardware::mock::MockReader;
    ///
    /// let (reader, handle) =
    ///     MockReader::with_capabilities("Contactless 01", ReaderCapabilities::ping_only());
    /// ```
    pub fn with_capabilities(
        name: impl Into<String>,
        capabilities: ReaderCapabilities,
    ) -> (Self, MockReaderHandle) {
        let (presence, _) = watch::channel(false);
        let (failure, _) = watch::channel(None);

        let shared = Arc::new(Shared {
            presence,
            failure,
            pings: AtomicU64::new(0),
            native_waits: AtomicU64::new(0),
        });

        let reader = Self {
            name: name.into(),
            capabilities,
            shared: Arc::clone(&shared),
        };

        (reader, MockReaderHandle { shared })
    }

    fn check_link(&self) -> Result<()> {
        match self.shared.failure.borrow().as_ref() {
            Some(message) => Err(HardwareError::communication(message.clone())),
            None => Ok(()),
        }
    }

    async fn wait_for_presence(
        &self,
        wanted: bool,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.check_link()?;
        self.shared.native_waits.fetch_add(1, Ordering::Relaxed);
        trace!(reader = %self.name, wanted, ?timeout, "Native presence wait");

        let mut presence = self.shared.presence.subscribe();
        let mut failure = self.shared.failure.subscribe();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(false),
            result = failure.wait_for(Option::is_some) => match result {
                Ok(message) => Err(HardwareError::communication(
                    message.clone().unwrap_or_default(),
                )),
                Err(_) => Err(HardwareError::disconnected(self.name.clone())),
            },
            result = presence.wait_for(|present| *present == wanted) => match result {
                Ok(_) => Ok(true),
                Err(_) => Err(HardwareError::disconnected(self.name.clone())),
            },
            _ = expire(timeout) => Ok(false),
        }
    }
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => pending().await,
    }
}

impl Default for MockReader {
    fn default() -> Self {
        Self::new().0
    }
}

impl CardReader for MockReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ReaderCapabilities {
        self.capabilities
    }

    async fn wait_for_card_present(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if !self.capabilities.smart_insertion {
            return Err(HardwareError::unsupported("wait_for_card_present"));
        }
        self.wait_for_presence(true, timeout, cancel).await
    }

    async fn wait_for_card_absent_native(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if !self.capabilities.smart_removal {
            return Err(HardwareError::unsupported("wait_for_card_absent_native"));
        }
        self.wait_for_presence(false, timeout, cancel).await
    }

    async fn is_card_present_ping(&self) -> Result<bool> {
        self.check_link()?;
        self.shared.pings.fetch_add(1, Ordering::Relaxed);
        Ok(*self.shared.presence.borrow())
    }
}

/// Handle for controlling a mock reader.
///
/// Cloning the handle shares the same reader state.
///
/// # Examples
///
/// ```
/// use cardwatch_hardware::mock::MockReader;
///
/// let (_reader, handle) = MockReader::new();
///
/// handle.insert_card();
/// assert!(handle.is_card_present());
///
/// handle.fail_with("reader unplugged");
/// handle.restore_link();
///
/// handle.remove_card();
/// assert!(!handle.is_card_present());
/// ```
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    shared: Arc<Shared>,
}

impl MockReaderHandle {
    /// Put a card in the reader field.
    pub fn insert_card(&self) {
        self.shared.presence.send_replace(true);
    }

    /// Pull the card out of the reader field.
    pub fn remove_card(&self) {
        self.shared.presence.send_replace(false);
    }

    /// Check if a card is currently in the field.
    pub fn is_card_present(&self) -> bool {
        *self.shared.presence.borrow()
    }

    /// Make every capability call fail with a communication error, including
    /// waits already in progress.
    pub fn fail_with(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "Mock reader link failure injected");
        self.shared.failure.send_replace(Some(message));
    }

    /// Clear an injected link failure.
    pub fn restore_link(&self) {
        debug!("Mock reader link restored");
        self.shared.failure.send_replace(None);
    }

    /// Number of presence pings served so far.
    pub fn ping_count(&self) -> u64 {
        self.shared.pings.load(Ordering::Relaxed)
    }

    /// Number of native waits started so far.
    pub fn native_wait_count(&self) -> u64 {
        self.shared.native_waits.load(Ordering::Relaxed)
    }
}
