//! Observation engine configuration.
//!
//! All durations are expressed in milliseconds so the configuration can be
//! loaded from JSON as-is. A phase deadline of `0` disables it.
//!
//! # Examples
//!
//! ```
//! use cardwatch_observer::ObservationConfig;
//! use std::time::Duration;
//!
//! let config = ObservationConfig::default()
//!     .with_removal_timeout_ms(5_000)
//!     .with_ping_interval_ms(50);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.removal_deadline(), Some(Duration::from_secs(5)));
//! assert_eq!(config.processing_deadline(), None);
//! ```

use std::time::Duration;

use cardwatch_core::constants::{
    DEADLINE_DISABLED, DEFAULT_ERROR_CHANNEL_CAPACITY, DEFAULT_INSERTION_TIMEOUT_MS,
    DEFAULT_PING_INTERVAL_MS, DEFAULT_PROCESSING_TIMEOUT_MS, DEFAULT_REMOVAL_TIMEOUT_MS,
    MAX_PING_INTERVAL_MS, MIN_PING_INTERVAL_MS,
};
use cardwatch_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::state::MonitoringState;

/// Timing and channel settings of one observed reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservationConfig {
    /// Insertion phase deadline. On expiry the insertion job is re-armed.
    pub insertion_timeout_ms: u64,

    /// Processing phase deadline. On expiry `TimeoutError` is emitted.
    pub processing_timeout_ms: u64,

    /// Removal phase deadline. On expiry `TimeoutError` is emitted.
    pub removal_timeout_ms: u64,

    /// Interval between presence pings of polling jobs.
    pub ping_interval_ms: u64,

    /// Consecutive insertion deadlines tolerated before `TimeoutError` is
    /// emitted and detection stops. `None` retries forever.
    pub insertion_retry_limit: Option<u32>,

    /// Capacity of the side error broadcast channel.
    pub error_channel_capacity: usize,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            insertion_timeout_ms: DEFAULT_INSERTION_TIMEOUT_MS,
            processing_timeout_ms: DEFAULT_PROCESSING_TIMEOUT_MS,
            removal_timeout_ms: DEFAULT_REMOVAL_TIMEOUT_MS,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            insertion_retry_limit: None,
            error_channel_capacity: DEFAULT_ERROR_CHANNEL_CAPACITY,
        }
    }
}

impl ObservationConfig {
    /// Parse a JSON document and validate it.
    ///
    /// Missing fields take their default value; unknown fields are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document does not parse, or
    /// [`Error::InvalidConfigValue`] if a field is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardwatch_observer::ObservationConfig;
    ///
    /// let config = ObservationConfig::from_json(r#"{ "ping_interval_ms": 10 }"#).unwrap();
    /// assert_eq!(config.ping_interval_ms, 10);
    ///
    /// assert!(ObservationConfig::from_json(r#"{ "ping_interval": 10 }"#).is_err());
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_insertion_timeout_ms(mut self, millis: u64) -> Self {
        self.insertion_timeout_ms = millis;
        self
    }

    pub fn with_processing_timeout_ms(mut self, millis: u64) -> Self {
        self.processing_timeout_ms = millis;
        self
    }

    pub fn with_removal_timeout_ms(mut self, millis: u64) -> Self {
        self.removal_timeout_ms = millis;
        self
    }

    pub fn with_ping_interval_ms(mut self, millis: u64) -> Self {
        self.ping_interval_ms = millis;
        self
    }

    pub fn with_insertion_retry_limit(mut self, limit: Option<u32>) -> Self {
        self.insertion_retry_limit = limit;
        self
    }

    pub fn with_error_channel_capacity(mut self, capacity: usize) -> Self {
        self.error_channel_capacity = capacity;
        self
    }

    /// Check every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfigValue`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PING_INTERVAL_MS..=MAX_PING_INTERVAL_MS).contains(&self.ping_interval_ms) {
            return Err(Error::invalid_config(
                "ping_interval_ms",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_PING_INTERVAL_MS, MAX_PING_INTERVAL_MS, self.ping_interval_ms
                ),
            ));
        }

        if self.error_channel_capacity == 0 {
            return Err(Error::invalid_config(
                "error_channel_capacity",
                "must be greater than 0",
            ));
        }

        if self.insertion_retry_limit == Some(0) {
            return Err(Error::invalid_config(
                "insertion_retry_limit",
                "must be at least 1, use null for unlimited retries",
            ));
        }

        Ok(())
    }

    pub fn insertion_deadline(&self) -> Option<Duration> {
        deadline(self.insertion_timeout_ms)
    }

    pub fn processing_deadline(&self) -> Option<Duration> {
        deadline(self.processing_timeout_ms)
    }

    pub fn removal_deadline(&self) -> Option<Duration> {
        deadline(self.removal_timeout_ms)
    }

    /// Deadline of the phase owned by `state`, if any.
    pub fn deadline_for(&self, state: MonitoringState) -> Option<Duration> {
        match state {
            MonitoringState::AwaitingStart => None,
            MonitoringState::AwaitingInsertion => self.insertion_deadline(),
            MonitoringState::Processing => self.processing_deadline(),
            MonitoringState::AwaitingRemoval => self.removal_deadline(),
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

fn deadline(millis: u64) -> Option<Duration> {
    (millis != DEADLINE_DISABLED).then(|| Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = ObservationConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.insertion_deadline(), Some(Duration::from_secs(10)));
        assert_eq!(config.processing_deadline(), None);
        assert_eq!(config.removal_deadline(), Some(Duration::from_secs(10)));
        assert_eq!(config.ping_interval(), Duration::from_millis(30));
        assert_eq!(config.insertion_retry_limit, None);
    }

    #[rstest]
    #[case(MonitoringState::AwaitingStart, None)]
    #[case(MonitoringState::AwaitingInsertion, Some(Duration::from_millis(100)))]
    #[case(MonitoringState::Processing, None)]
    #[case(MonitoringState::AwaitingRemoval, Some(Duration::from_millis(300)))]
    fn test_deadline_for(#[case] state: MonitoringState, #[case] expected: Option<Duration>) {
        let config = ObservationConfig::default()
            .with_insertion_timeout_ms(100)
            .with_processing_timeout_ms(0)
            .with_removal_timeout_ms(300);

        assert_eq!(config.deadline_for(state), expected);
    }

    #[rstest]
    #[case(0)]
    #[case(1_001)]
    fn test_ping_interval_out_of_range(#[case] millis: u64) {
        let config = ObservationConfig::default().with_ping_interval_ms(millis);
        let error = config.validate().unwrap_err();

        assert!(matches!(
            error,
            Error::InvalidConfigValue {
                field: "ping_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ObservationConfig::default().with_error_channel_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retry_limit_rejected() {
        let config = ObservationConfig::default().with_insertion_retry_limit(Some(0));
        assert!(config.validate().is_err());

        let config = ObservationConfig::default().with_insertion_retry_limit(Some(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = ObservationConfig::from_json(
            r#"{ "removal_timeout_ms": 0, "insertion_retry_limit": 5 }"#,
        )
        .unwrap();

        assert_eq!(config.removal_deadline(), None);
        assert_eq!(config.insertion_retry_limit, Some(5));
        assert_eq!(config.ping_interval_ms, DEFAULT_PING_INTERVAL_MS);
    }

    #[test]
    fn test_from_json_rejects_unknown_field() {
        let error = ObservationConfig::from_json(r#"{ "poll_ms": 5 }"#).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn test_from_json_validates() {
        let error = ObservationConfig::from_json(r#"{ "ping_interval_ms": 0 }"#).unwrap_err();
        assert!(matches!(error, Error::InvalidConfigValue { .. }));
    }
}
