//! Error types for the ensemble gateway core.
//!
//! Internal per-stage errors use [`Error`]; only three variants of
//! [`EnsembleError`] are ever allowed to cross the Orchestrator boundary
//! and surface to a caller.

use thiserror::Error;

/// Result type alias using our internal `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Internal error type, one variant per subsystem.
#[derive(Error, Debug)]
pub enum Error {
    /// Provider Client errors (transport, malformed payloads, etc).
    #[error("provider error: {0}")]
    Provider(String),

    /// Calibration subsystem errors.
    #[error("calibration error: {0}")]
    Calibration(String),

    /// Voter errors.
    #[error("voting error: {0}")]
    Voting(String),

    /// Synthesizer errors.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Validator errors.
    #[error("validation error: {0}")]
    Validation(String),

    /// Admission queue errors.
    #[error("admission error: {0}")]
    Admission(String),

    /// Response cache errors.
    #[error("cache error: {0}")]
    Cache(String),

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request errors (upstream provider adapters).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with added context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a calibration error.
    pub fn calibration(msg: impl Into<String>) -> Self {
        Self::Calibration(msg.into())
    }

    /// Create a voting error.
    pub fn voting(msg: impl Into<String>) -> Self {
        Self::Voting(msg.into())
    }

    /// Create a synthesis error.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an admission error.
    pub fn admission(msg: impl Into<String>) -> Self {
        Self::Admission(msg.into())
    }

    /// Create a cache error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

/// The three caller-visible error kinds. Every other internal
/// failure is degraded to a successful envelope carrying diagnostics —
/// the Orchestrator never propagates anything else past itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnsembleError {
    /// Bad input (HTTP 400).
    #[error("validation error: {message}")]
    ValidationError {
        /// Human-readable explanation.
        message: String,
    },

    /// Admission queue full, or the request's deadline elapsed before
    /// admission (HTTP 429).
    #[error("admission refused: {message}")]
    AdmissionRefused {
        /// Human-readable explanation.
        message: String,
        /// Suggested retry-after, in seconds.
        retry_after_secs: u64,
    },

    /// No provider produced a usable response and the cache missed
    /// (HTTP 503).
    #[error("no providers responded")]
    NoProvidersResponded,
}

impl EnsembleError {
    /// Whether a caller may retry this error.
    pub fn retryable(&self) -> bool {
        !matches!(self, EnsembleError::ValidationError { .. })
    }

    /// The HTTP status code this error maps onto.
    pub fn http_status(&self) -> u16 {
        match self {
            EnsembleError::ValidationError { .. } => 400,
            EnsembleError::AdmissionRefused { .. } => 429,
            EnsembleError::NoProvidersResponded => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::provider("timeout");
        assert_eq!(err.to_string(), "provider error: timeout");
    }

    #[test]
    fn error_with_context() {
        let err = Error::cache("miss").with_context("fingerprint lookup");
        assert!(err.to_string().contains("fingerprint lookup"));
    }

    #[test]
    fn ensemble_error_http_status() {
        assert_eq!(EnsembleError::NoProvidersResponded.http_status(), 503);
        assert_eq!(
            EnsembleError::ValidationError { message: "bad".into() }.http_status(),
            400
        );
        assert!(!EnsembleError::ValidationError { message: "bad".into() }.retryable());
        assert!(EnsembleError::NoProvidersResponded.retryable());
    }
}
