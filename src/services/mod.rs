//! Services
//!
//! Core logic: connection lifecycle, the reconciler fold, derived progress
//! and graph views, timeline playback, and the session composition root.

pub mod api;
pub mod connection;
pub mod graph;
pub mod progress;
pub mod reconciler;
pub mod session;
pub mod timeline;

pub use api::{ApiClient, EvaluationResult, StartEvaluationRequest, StartEvaluationResponse};
pub use connection::{
    ConnectionState, EventStream, EventTransport, SseTransport, StreamConnection, MAX_RETRIES,
};
pub use graph::ExecutionGraphBuilder;
pub use progress::ProgressCalculator;
pub use reconciler::EventReconciler;
pub use session::EvaluationSession;
pub use timeline::{PlaybackSpeed, PlaybackState, TimelinePlayer};
