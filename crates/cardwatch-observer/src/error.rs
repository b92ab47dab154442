//! Side-channel errors of the observation engine.
//!
//! None of these ever stop the monitoring worker. They are logged and
//! published on a broadcast channel the application can subscribe to with
//! [`ObservableReader::subscribe_errors`](crate::ObservableReader::subscribe_errors).

use cardwatch_core::ObserverId;

use crate::state::MonitoringState;

/// Error reported outside of the event stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ObservationError {
    /// An observer returned an error or panicked while handling an event.
    #[error("Observer {observer} failed: {message}")]
    Observer { observer: ObserverId, message: String },

    /// A reader capability call failed; detection was stopped.
    #[error("Reader communication failed in {state}: {message}")]
    Communication {
        state: MonitoringState,
        message: String,
    },

    /// A phase deadline expired and `TimeoutError` was emitted.
    #[error("Deadline exceeded in {state}")]
    Deadline { state: MonitoringState },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let error = ObservationError::Deadline {
            state: MonitoringState::AwaitingRemoval,
        };
        assert_eq!(error.to_string(), "Deadline exceeded in AWAITING_REMOVAL");

        let error = ObservationError::Communication {
            state: MonitoringState::AwaitingInsertion,
            message: "reader unplugged".to_string(),
        };
        assert!(error.to_string().contains("reader unplugged"));
    }
}
