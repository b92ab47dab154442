//! Reader capability contracts for the cardwatch observation engine.
//!
//! The observation engine never talks to a PC/SC stack, an NFC controller or
//! an OMAPI service directly. It consumes a narrow [`CardReader`] contract
//! exposing three presence primitives:
//!
//! - a blocking native insertion wait ([`CardReader::wait_for_card_present`]),
//! - a blocking native removal wait ([`CardReader::wait_for_card_absent_native`]),
//! - a cheap presence probe ([`CardReader::is_card_present_ping`]).
//!
//! Which of the blocking primitives a reader really supports is declared once
//! through [`ReaderCapabilities`]; the engine picks its monitoring strategy
//! from those flags at construction time instead of probing at runtime.
//!
//! # Example
//!
//! ```
//! use cardwatch_hardware::{CardReader, ReaderCapabilities};
//! use cardwatch_hardware::mock::MockReader;
//!
//! #[tokio::main]
//! async fn main() -> cardwatch_hardware::Result<()> {
//!     let (reader, handle) = MockReader::new();
//!     assert!(!reader.is_card_present_ping().await?);
//!
//!     handle.insert_card();
//!     assert!(reader.is_card_present_ping().await?);
//!     assert_eq!(reader.capabilities(), ReaderCapabilities::native());
//!     Ok(())
//! }
//! ```
//!
//! # Cancellation
//!
//! Blocking primitives receive a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! and must return `Ok(false)` promptly once it is cancelled. `false` always
//! means "interrupted, no detection", never a failure.

pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

pub use error::{HardwareError, Result};
pub use traits::CardReader;
pub use types::ReaderCapabilities;
