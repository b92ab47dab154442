//! Shared vocabulary for the cardwatch reader observation stack.
//!
//! Holds the types that both the hardware capability layer and the
//! observation engine speak: the polling policy, observer identities,
//! the engine-level error type and the default timing constants.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
