//! Error types for the ModelFox client

use thiserror::Error;

/// Errors surfaced by model loading, prediction and event logging
#[derive(Error, Debug)]
pub enum Error {
    /// The evaluator produced a record this client does not understand
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// The evaluator failed to make predictions for a batch
    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    /// Events could not be delivered to the tracking endpoint
    #[error("Failed to send events to the app{}: {body}", status_suffix(.status))]
    LogTransportFailed { status: Option<u16>, body: String },

    /// The evaluator could not load the model
    #[error("Failed to load model: {0}")]
    ModelLoadFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" (status {})", status),
        None => String::new(),
    }
}

impl Error {
    /// Only transport failures can succeed when retried unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LogTransportFailed { .. })
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Error::SchemaViolation(message.into())
    }
}

/// Error reported across the evaluator boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for NativeError {
    fn from(error: anyhow::Error) -> Self {
        // Keep the whole context chain, tract errors are deeply nested
        NativeError::new(format!("{:#}", error))
    }
}

/// Result type for ModelFox operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_failures_are_retryable() {
        let transport = Error::LogTransportFailed {
            status: Some(500),
            body: "boom".to_string(),
        };
        assert!(transport.is_retryable());
        assert!(!Error::schema("unknown type 9").is_retryable());
        assert!(!Error::PredictionFailed("bad input".to_string()).is_retryable());
        assert!(!Error::ModelLoadFailed("truncated".to_string()).is_retryable());
    }

    #[test]
    fn test_transport_failure_message_includes_status_and_body() {
        let error = Error::LogTransportFailed {
            status: Some(503),
            body: "unavailable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to send events to the app (status 503): unavailable"
        );

        let error = Error::LogTransportFailed {
            status: None,
            body: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to send events to the app: connection refused"
        );
    }

    #[test]
    fn test_native_error_keeps_context_chain() {
        let error = anyhow::anyhow!("inner").context("outer");
        let native: NativeError = error.into();
        assert_eq!(native.message, "outer: inner");
    }
}
