//! Error types for the geolocation resolver
//!
//! Errors never escape [`crate::Resolver::resolve`]; they travel inside
//! [`crate::ProviderOutcome::Failed`] and surface in logs and configuration.

use thiserror::Error;

/// Result type alias for geolocation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the geolocation system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure (DNS, connect, TLS, read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider did not answer within its timeout
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Non-success HTTP status other than 429
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    /// Body was not JSON or lacked the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP transport error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a malformed response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
