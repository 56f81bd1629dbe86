//! Sommelier Client
//!
//! Client-side consumer for the Sommelier multi-agent code-evaluation
//! pipeline. Subscribes to a run's server-pushed event stream and turns it
//! into a monotonic progress/status model and a replayable execution graph
//! with a timeline scrubber, tolerating reconnects, duplicated and missing
//! events, and partial stage failures.
//!
//! ## Module Organization
//!
//! - `models` - Wire events, reconciled session state, graph structures
//! - `services` - Connection lifecycle, reconciler fold, progress, graph
//!   builder, timeline player, session composition root, REST client
//! - `utils` - Error types and API configuration
//!
//! ## Quick start
//!
//! ```no_run
//! use sommelier_client::services::EvaluationSession;
//! use sommelier_client::utils::ApiConfig;
//!
//! # async fn run() -> Result<(), sommelier_client::utils::AppError> {
//! let session = EvaluationSession::connect(ApiConfig::from_env(), "eval-42")?;
//! let final_snapshot = session.wait_for_terminal().await?;
//! println!("score: {:?}", final_snapshot.final_score);
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod services;
pub mod utils;

pub use models::{
    EvaluationEvent, EvaluationPhase, ExecutionGraph, GraphEdge, GraphNode, PipelineMode,
    SessionSnapshot, StageRecord, StageStatus,
};
pub use services::{
    ApiClient, ConnectionState, EvaluationSession, EventReconciler, EventTransport,
    ExecutionGraphBuilder, ProgressCalculator, TimelinePlayer,
};
pub use utils::{ApiConfig, AppError, AppResult};
