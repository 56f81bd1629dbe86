//! Evaluation Stream Events
//!
//! Wire-format events pushed over the SSE channel for one evaluation run.
//! Events carry no sequence numbers; the reconciler is order- and
//! duplicate-tolerant by content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event from the evaluation stream.
///
/// The wire discriminator is `event_type`. Stage identifiers arrive as
/// `sommelier` in the classic flow and `technique_id` in the deep flow;
/// both deserialize into `stage_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EvaluationEvent {
    /// A pipeline stage began executing
    StageStart {
        #[serde(alias = "sommelier", alias = "technique_id")]
        stage_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        technique_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        category_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// A pipeline stage finished successfully
    StageComplete {
        #[serde(alias = "sommelier", alias = "technique_id")]
        stage_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        category_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_score: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens_used: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// A pipeline stage failed (non-fatal for the session)
    StageError {
        #[serde(alias = "sommelier", alias = "technique_id")]
        stage_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        category_id: Option<String>,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// A technique category began (deep flow only)
    CategoryStart {
        category_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// A technique category finished (deep flow only)
    CategoryComplete {
        category_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// The synthesis step began
    SynthesisStart {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// The synthesis step finished
    SynthesisComplete {
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// Keepalive; may carry an authoritative progress percentage
    Heartbeat {
        #[serde(skip_serializing_if = "Option::is_none")]
        progress_percent: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// The whole run finished successfully (terminal)
    SessionComplete {
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens_used: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// The whole run failed (terminal)
    SessionError {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl EvaluationEvent {
    /// Stage id referenced by this event, if any.
    pub fn stage_id(&self) -> Option<&str> {
        match self {
            EvaluationEvent::StageStart { stage_id, .. }
            | EvaluationEvent::StageComplete { stage_id, .. }
            | EvaluationEvent::StageError { stage_id, .. } => Some(stage_id),
            _ => None,
        }
    }

    /// Category id referenced by this event, if any.
    pub fn category_id(&self) -> Option<&str> {
        match self {
            EvaluationEvent::StageStart { category_id, .. }
            | EvaluationEvent::StageComplete { category_id, .. }
            | EvaluationEvent::StageError { category_id, .. } => category_id.as_deref(),
            EvaluationEvent::CategoryStart { category_id, .. }
            | EvaluationEvent::CategoryComplete { category_id, .. } => Some(category_id),
            _ => None,
        }
    }

    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EvaluationEvent::SessionComplete { .. } | EvaluationEvent::SessionError { .. }
        )
    }

    /// Short label for the recent-event log.
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationEvent::StageStart { .. } => "stage_start",
            EvaluationEvent::StageComplete { .. } => "stage_complete",
            EvaluationEvent::StageError { .. } => "stage_error",
            EvaluationEvent::CategoryStart { .. } => "category_start",
            EvaluationEvent::CategoryComplete { .. } => "category_complete",
            EvaluationEvent::SynthesisStart { .. } => "synthesis_start",
            EvaluationEvent::SynthesisComplete { .. } => "synthesis_complete",
            EvaluationEvent::Heartbeat { .. } => "heartbeat",
            EvaluationEvent::SessionComplete { .. } => "session_complete",
            EvaluationEvent::SessionError { .. } => "session_error",
        }
    }
}
