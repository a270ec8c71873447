//! Error types for cfddns
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for cfddns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cfddns
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport errors (connect, timeout, non-success status)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The IP lookup response did not contain a valid IPv4 address
    #[error("No address found: {0}")]
    AddressNotFound(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The daemon task panicked or was aborted
    #[error("Daemon task failed: {0}")]
    Task(String),
}

impl Error {
    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a "no address found" error
    pub fn address_not_found(msg: impl Into<String>) -> Self {
        Self::AddressNotFound(msg.into())
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

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the next tick has a reasonable chance of succeeding without
    /// any operator action (network blips, throttling)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::RateLimited(_))
    }
}
