//! Client Configuration
//!
//! Base-URL and auth configuration for the evaluation API.
//! The base URL is the only externally visible configuration surface.

use std::time::Duration;

use url::Url;

use crate::utils::error::{AppError, AppResult};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default API origin when nothing is configured.
const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment variable selecting the API origin.
pub const BASE_URL_ENV: &str = "SOMMELIER_API_BASE_URL";

/// Environment variable carrying an optional bearer token.
pub const AUTH_TOKEN_ENV: &str = "SOMMELIER_API_TOKEN";

/// Configuration for the evaluation API client and stream connection.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API origin, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Optional bearer token for authenticated channels.
    pub auth_token: Option<String>,
    /// Request timeout for REST calls (the stream itself is unbounded).
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    /// Create a configuration for the given origin.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let auth_token = std::env::var(AUTH_TOKEN_ENV).ok().filter(|t| !t.is_empty());

        Self {
            base_url,
            auth_token,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Attach a bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Join a path onto the configured origin.
    pub fn endpoint(&self, path: &str) -> AppResult<String> {
        Ok(self.endpoint_url(path)?.to_string())
    }

    fn endpoint_url(&self, path: &str) -> AppResult<Url> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| AppError::config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        base.join(path)
            .map_err(|e| AppError::config(format!("Invalid endpoint path '{}': {}", path, e)))
    }

    /// URL of the SSE event channel for one evaluation.
    pub fn stream_url(&self, evaluation_id: &str) -> AppResult<String> {
        let mut url = self.endpoint_url(&format!("/api/evaluate/{}/stream", evaluation_id))?;
        // Authenticated channels take the token as a query parameter since
        // EventSource-style clients cannot set headers.
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.to_string())
    }
}
