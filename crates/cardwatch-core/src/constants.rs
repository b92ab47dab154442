//! Default timing constants for reader observation.
//!
//! Every phase that owns a monitoring job has a maximum wait. A value of `0`
//! for a phase deadline disables the check for that phase.
//!
//! # Usage
//!
//! ```
//! use cardwatch_core::constants::*;
//! use std::time::Duration;
//!
//! let interval = Duration::from_millis(DEFAULT_PING_INTERVAL_MS);
//! assert!(interval < Duration::from_millis(DEFAULT_INSERTION_TIMEOUT_MS));
//! ```

// ============================================================================
// Phase deadlines
// ============================================================================

/// Maximum wait for a card to be inserted before the insertion job is re-armed.
pub const DEFAULT_INSERTION_TIMEOUT_MS: u64 = 10_000;

/// Maximum time the application may spend processing an inserted card.
///
/// Disabled by default: processing ends only when the application calls
/// `notify_processing_done` or the card is pulled.
pub const DEFAULT_PROCESSING_TIMEOUT_MS: u64 = 0;

/// Maximum wait for a card to be removed before `TimeoutError` is raised.
pub const DEFAULT_REMOVAL_TIMEOUT_MS: u64 = 10_000;

/// Sentinel deadline value meaning "no deadline".
pub const DEADLINE_DISABLED: u64 = 0;

// ============================================================================
// Polling
// ============================================================================

/// Interval between two presence pings in polling jobs.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 30;

/// Smallest accepted ping interval.
pub const MIN_PING_INTERVAL_MS: u64 = 1;

/// Largest accepted ping interval. Above this, polling jobs stop being
/// responsive enough to be worth running.
pub const MAX_PING_INTERVAL_MS: u64 = 1_000;

// ============================================================================
// Channels
// ============================================================================

/// Capacity of the broadcast channel carrying side errors.
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 32;
