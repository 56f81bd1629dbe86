//! Evaluation API Client
//!
//! Thin typed wrappers over the REST collaborators that bracket the event
//! stream: starting an evaluation and fetching its final result. The result
//! endpoint is consumed only after the reconciler reports the terminal
//! state, never polled while the stream is live.

use serde::{Deserialize, Serialize};

use crate::models::session::PipelineMode;
use crate::utils::config::ApiConfig;
use crate::utils::error::{AppError, AppResult};

/// Request body for `POST /api/evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartEvaluationRequest {
    /// Repository to evaluate
    pub repo_url: String,
    /// Evaluation criteria selected by the user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<String>,
    /// Pipeline shape to run
    pub evaluation_mode: PipelineMode,
}

/// Response body for `POST /api/evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartEvaluationResponse {
    /// Id to subscribe with
    pub evaluation_id: String,
    /// Initial server-side status
    pub status: String,
}

/// Output of one sommelier/technique in the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    #[serde(alias = "sommelier", alias = "technique_id")]
    pub stage_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Response body for `GET /api/evaluate/{id}/result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub evaluation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(default)]
    pub outputs: Vec<StageOutput>,
}

/// HTTP client for the evaluation REST endpoints.
pub struct ApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    /// Create a client for the configured API origin.
    pub fn new(config: ApiConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Wrap an existing reqwest client (caller controls TLS/proxy setup).
    pub fn with_reqwest_client(client: reqwest::Client, config: ApiConfig) -> Self {
        Self { client, config }
    }

    /// Submit a repository for evaluation.
    pub async fn start_evaluation(
        &self,
        request: &StartEvaluationRequest,
    ) -> AppResult<StartEvaluationResponse> {
        let url = self.config.endpoint("/api/evaluate")?;
        // Correlates retried submissions server-side.
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut builder = self
            .client
            .post(&url)
            .header("x-request-id", request_id)
            .json(request);
        if let Some(token) = &self.config.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Http { status, body });
        }

        response.json().await.map_err(|e| {
            AppError::invalid_response(format!("Failed to parse start response: {}", e))
        })
    }

    /// Fetch the final result for a terminal evaluation.
    pub async fn fetch_result(&self, evaluation_id: &str) -> AppResult<EvaluationResult> {
        let url = self
            .config
            .endpoint(&format!("/api/evaluate/{}/result", evaluation_id))?;
        let mut builder = self.client.get(&url);
        if let Some(token) = &self.config.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Http { status, body });
        }

        response.json().await.map_err(|e| {
            AppError::invalid_response(format!("Failed to parse result response: {}", e))
        })
    }
}
