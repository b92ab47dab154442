//! Error types for reader capability calls.
//!
//! Any error returned by a capability is treated by the observation engine as
//! a transient communication failure: the engine stops detection and returns
//! to idle rather than crashing its worker.

/// Result type alias for reader capability calls.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while probing a reader.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Reader is not connected or has been disconnected.
    #[error("Reader disconnected: {reader}")]
    Disconnected { reader: String },

    /// Capability is not provided by this reader.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Reader communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(reader: impl Into<String>) -> Self {
        Self::Disconnected {
            reader: reader.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Whether the failure points at a wiring mistake rather than the hardware.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("ACR122U");
        assert!(matches!(error, HardwareError::Disconnected { .. }));
        assert_eq!(error.to_string(), "Reader disconnected: ACR122U");
    }

    #[test]
    fn test_unsupported_error() {
        let error = HardwareError::unsupported("wait_for_card_absent_native");
        assert!(error.is_unsupported());
        assert_eq!(
            error.to_string(),
            "Unsupported operation: wait_for_card_absent_native"
        );
    }

    #[test]
    fn test_communication_error() {
        let error = HardwareError::communication("SCardStatus failed");
        assert!(!error.is_unsupported());
        assert_eq!(error.to_string(), "Communication error: SCardStatus failed");
    }
}
