use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Runtime errors
    #[error("No tokio runtime available to start the monitoring worker")]
    NoRuntime,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidConfigValue { field: &'static str, reason: String },
}

impl Error {
    /// Shorthand for an out-of-range configuration field.
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
