//! Error Handling
//!
//! Unified error types for the client library.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Network-level errors (connect, read) from the transport
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP responses from the API
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// JSON serialization/deserialization errors
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Responses that parsed but did not match the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration errors (bad base URL, missing settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operations attempted on a closed session
    #[error("Session closed: {0}")]
    Closed(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an invalid-response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a closed-session error
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

/// Convert AppError to a string suitable for UI-facing responses
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
