//! Capability flags shared by reader implementations.

use serde::{Deserialize, Serialize};

/// Blocking presence primitives a reader natively provides.
///
/// Resolved once when the observation engine is built. A reader without
/// native insertion detection is observed by ping polling; a reader without
/// native removal detection is polled for removal and only watched by a
/// deadline while the application is processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ReaderCapabilities {
    /// `wait_for_card_present` is implemented.
    pub smart_insertion: bool,

    /// `wait_for_card_absent_native` is implemented.
    pub smart_removal: bool,
}

impl ReaderCapabilities {
    /// Reader with both native waits (PC/SC style).
    pub const fn native() -> Self {
        Self {
            smart_insertion: true,
            smart_removal: true,
        }
    }

    /// Reader that can only be pinged.
    pub const fn ping_only() -> Self {
        Self {
            smart_insertion: false,
            smart_removal: false,
        }
    }

    /// Set native insertion support.
    pub const fn with_smart_insertion(mut self, enabled: bool) -> Self {
        self.smart_insertion = enabled;
        self
    }

    /// Set native removal support.
    pub const fn with_smart_removal(mut self, enabled: bool) -> Self {
        self.smart_removal = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert!(ReaderCapabilities::native().smart_insertion);
        assert!(ReaderCapabilities::native().smart_removal);
        assert_eq!(ReaderCapabilities::ping_only(), ReaderCapabilities::default());
    }

    #[test]
    fn test_builder() {
        let caps = ReaderCapabilities::ping_only().with_smart_removal(true);
        assert!(!caps.smart_insertion);
        assert!(caps.smart_removal);
    }

    #[test]
    fn test_serialization() {
        let caps = ReaderCapabilities::native().with_smart_insertion(false);
        let json = serde_json::to_string(&caps).unwrap();
        let back: ReaderCapabilities = serde_json::from_str(&json).unwrap();
        assert_eq!(caps, back);
    }
}
