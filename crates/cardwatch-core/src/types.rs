use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Policy applied once the application has finished with an inserted card.
///
/// Chosen when detection starts and latched until the engine returns to
/// `AwaitingStart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingMode {
    /// Watch for removal, then re-arm insertion detection.
    #[default]
    Continue,

    /// Close the card and go back to idle after processing.
    StopAfter,
}

impl fmt::Display for PollingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollingMode::Continue => write!(f, "CONTINUE"),
            PollingMode::StopAfter => write!(f, "STOP_AFTER"),
        }
    }
}

/// Identity of a registered reader observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// Allocate a fresh random observer identity.
    #[must_use]
    pub fn new() -> Self {
        ObserverId(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PollingMode::Continue, "\"continue\"")]
    #[case(PollingMode::StopAfter, "\"stop_after\"")]
    fn test_polling_mode_serde(#[case] mode: PollingMode, #[case] json: &str) {
        assert_eq!(serde_json::to_string(&mode).unwrap(), json);
        assert_eq!(serde_json::from_str::<PollingMode>(json).unwrap(), mode);
    }

    #[test]
    fn test_polling_mode_default_is_continue() {
        assert_eq!(PollingMode::default(), PollingMode::Continue);
    }

    #[test]
    fn test_observer_ids_are_unique() {
        let a = ObserverId::new();
        let b = ObserverId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }
}
