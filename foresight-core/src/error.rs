//! Error types for Foresight operations
//!
//! Logical failures (an action reporting a non-success [`Outcome`]) are not
//! errors; they drive rollback or stream correction. The variants here cover
//! infrastructure faults, policy violations, and configuration problems.
//!
//! [`Outcome`]: crate::outcome::Outcome

/// Result type for Foresight operations
pub type Result<T> = std::result::Result<T, ForesightError>;

/// Error types for the Foresight engine
#[derive(Debug, thiserror::Error)]
pub enum ForesightError {
    /// An action failed outside of the outcome contract
    #[error("Action '{action}' failed: {message}")]
    Action { action: String, message: String },

    /// An action task panicked or was aborted before reporting an outcome
    #[error("Action '{action}' did not complete: {message}")]
    ActionAborted { action: String, message: String },

    /// `invert` was requested on an action that cannot be reversed
    #[error("Action '{0}' is not invertible")]
    NotInvertible(String),

    /// Reversal of an invertible action failed
    #[error("Failed to invert '{action}': {message}")]
    Invert { action: String, message: String },

    /// The output producer failed while streaming
    #[error("Output producer error: {0}")]
    Producer(String),

    /// More than one correction was observed for a single speculation
    #[error("Too many mispredictions: observed {observed} corrections, at most {limit} supported")]
    CorrectionLimit { observed: usize, limit: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ForesightError {
    /// Create an infrastructure failure for the named action
    pub fn action(action: impl Into<String>, message: impl Into<String>) -> Self {
        ForesightError::Action {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create an inversion failure for the named action
    pub fn invert(action: impl Into<String>, message: impl Into<String>) -> Self {
        ForesightError::Invert {
            action: action.into(),
            message: message.into(),
        }
    }
}

impl From<String> for ForesightError {
    fn from(s: String) -> Self {
        ForesightError::Other(s)
    }
}

impl From<&str> for ForesightError {
    fn from(s: &str) -> Self {
        ForesightError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for ForesightError {
    fn from(err: anyhow::Error) -> Self {
        ForesightError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ForesightError::NotInvertible("send_email".to_string());
        assert_eq!(err.to_string(), "Action 'send_email' is not invertible");

        let err = ForesightError::CorrectionLimit {
            observed: 2,
            limit: 1,
        };
        assert!(err.to_string().starts_with("Too many mispredictions"));
    }

    #[test]
    fn test_string_conversions() {
        let err: ForesightError = "boom".into();
        assert!(matches!(err, ForesightError::Other(ref m) if m == "boom"));

        let err: ForesightError = anyhow::anyhow!("wrapped").into();
        assert_eq!(err.to_string(), "wrapped");
    }
}
