//! Error types for aiDroid
//!
//! This module defines the error taxonomy shared by the conversation store,
//! the context composer and the generation session, using `thiserror` for
//! ergonomic error handling.

use thiserror::Error;

/// Main error type for aiDroid operations
///
/// Every fallible operation returns [`Result`], which wraps one of these
/// variants. Callers that need to branch on the failure kind can use
/// `err.downcast_ref::<AidroidError>()`.
#[derive(Error, Debug)]
pub enum AidroidError {
    /// A required input was missing or empty; raised before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network or HTTP failure while talking to the model API
    #[error("Transport error: {0}")]
    Transport(String),

    /// The model API stream could not be interpreted
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AidroidError {
    /// Short, stable name of the error kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transport(_) | Self::Http(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) | Self::Yaml(_) => "serialization",
        }
    }
}

impl From<rusqlite::Error> for AidroidError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for aiDroid operations
///
/// Uses `anyhow::Error` so context can be attached while the typed
/// [`AidroidError`] remains recoverable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`AidroidError`] kind of an `anyhow` error, if it carries one
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<AidroidError>()
        .map(AidroidError::kind)
        .unwrap_or("other")
}
