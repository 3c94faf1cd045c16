//! Error types for zonesync
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for zonesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for zonesync
#[derive(Error, Debug)]
pub enum Error {
    /// Bad record data, unparsable target, or a desired record at an ignored label
    #[error("Validation failed for {record_type} record '{label}': {reason}")]
    Validation {
        /// Label of the offending record (relative to the zone)
        label: String,
        /// Record type of the offending record
        record_type: String,
        /// What was wrong
        reason: String,
    },

    /// Inconsistent input detected while computing a changeset
    #[error("Diff error: {0}")]
    Diff(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (reading zone files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider cannot perform the requested operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error for a record
    pub fn validation(
        label: impl Into<String>,
        record_type: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            label: label.into(),
            record_type: record_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a diff-internal error
    pub fn diff(msg: impl Into<String>) -> Self {
        Self::Diff(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an "unsupported" error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True when the zone was rejected before anything could be applied
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_record() {
        let err = Error::validation("www", "A", "not an IPv4 address");
        assert_eq!(
            err.to_string(),
            "Validation failed for A record 'www': not an IPv4 address"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_runtime_errors_are_not_validation() {
        assert!(!Error::provider("cloudflare", "boom").is_validation());
        assert!(!Error::diff("duplicate key").is_validation());
    }
}
