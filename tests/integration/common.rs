//! Shared test fixtures: event builders and scripted transports.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;

use sommelier_client::models::EvaluationEvent;
use sommelier_client::services::{EventStream, EventTransport};
use sommelier_client::utils::{AppError, AppResult};

/// One connect outcome per `connect` call, in order.
pub enum Script {
    /// Fail the connect itself
    ConnectError,
    /// Deliver these items, then keep the stream open
    Stream(Vec<AppResult<EvaluationEvent>>),
    /// Deliver these items, then drop the stream (mid-run failure)
    StreamThenDrop(Vec<AppResult<EvaluationEvent>>),
}

/// Transport that replays a fixed script of connect outcomes.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Script>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
        })
    }

    /// Single clean stream delivering the given events.
    pub fn single(events: Vec<EvaluationEvent>) -> Arc<Self> {
        Self::new(vec![Script::Stream(events.into_iter().map(Ok).collect())])
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn connect(&self, _session_id: &str) -> AppResult<EventStream> {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::ConnectError);
        match step {
            Script::ConnectError => Err(AppError::network("scripted connect failure")),
            Script::Stream(items) => {
                let stream = futures_util::stream::iter(items)
                    .chain(futures_util::stream::pending::<AppResult<EvaluationEvent>>());
                Ok(Box::pin(stream))
            }
            Script::StreamThenDrop(items) => Ok(Box::pin(futures_util::stream::iter(items))),
        }
    }
}

// ---- event builders ----

pub fn stage_start(stage_id: &str) -> EvaluationEvent {
    EvaluationEvent::StageStart {
        stage_id: stage_id.to_string(),
        technique_name: None,
        category_id: None,
        timestamp: None,
    }
}

pub fn stage_complete(stage_id: &str, score: f64) -> EvaluationEvent {
    EvaluationEvent::StageComplete {
        stage_id: stage_id.to_string(),
        category_id: None,
        score: Some(score),
        max_score: None,
        confidence: None,
        duration_ms: None,
        tokens_used: None,
        cost_usd: None,
        message: None,
        timestamp: None,
    }
}

pub fn technique_start(stage_id: &str, category_id: &str) -> EvaluationEvent {
    EvaluationEvent::StageStart {
        stage_id: stage_id.to_string(),
        technique_name: None,
        category_id: Some(category_id.to_string()),
        timestamp: None,
    }
}

pub fn technique_complete(stage_id: &str, category_id: &str, score: f64) -> EvaluationEvent {
    EvaluationEvent::StageComplete {
        stage_id: stage_id.to_string(),
        category_id: Some(category_id.to_string()),
        score: Some(score),
        max_score: None,
        confidence: None,
        duration_ms: None,
        tokens_used: None,
        cost_usd: None,
        message: None,
        timestamp: None,
    }
}

pub fn stage_error(stage_id: &str, error: &str) -> EvaluationEvent {
    EvaluationEvent::StageError {
        stage_id: stage_id.to_string(),
        category_id: None,
        error: error.to_string(),
        timestamp: None,
    }
}

pub fn heartbeat(progress: Option<u8>) -> EvaluationEvent {
    EvaluationEvent::Heartbeat {
        progress_percent: progress,
        message: None,
        timestamp: None,
    }
}

pub fn synthesis_start() -> EvaluationEvent {
    EvaluationEvent::SynthesisStart { timestamp: None }
}

pub fn synthesis_complete(score: f64) -> EvaluationEvent {
    EvaluationEvent::SynthesisComplete {
        score: Some(score),
        message: None,
        timestamp: None,
    }
}

pub fn session_complete(score: f64) -> EvaluationEvent {
    EvaluationEvent::SessionComplete {
        score: Some(score),
        message: None,
        tokens_used: None,
        cost_usd: None,
        timestamp: None,
    }
}

pub fn session_error(error: &str) -> EvaluationEvent {
    EvaluationEvent::SessionError {
        error: error.to_string(),
        timestamp: None,
    }
}
