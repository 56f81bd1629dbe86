//! Session State Models
//!
//! Reconciled state for one evaluation run: stage and category records and
//! the immutable-per-version `SessionSnapshot` the reconciler produces.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sommelier roster for the classic six-agent flow, in pipeline order.
pub const CLASSIC_SOMMELIERS: [&str; 6] =
    ["marcel", "isabella", "heinrich", "sofia", "kenji", "amelie"];

/// Technique categories for the deep flow with their technique counts.
/// Totals are fixed per mode at inference time; they are never recomputed
/// from observed events.
pub const DEEP_CATEGORIES: [(&str, u32); 8] = [
    ("structure", 10),
    ("clarity", 9),
    ("documentation", 9),
    ("testing", 10),
    ("security", 9),
    ("performance", 9),
    ("maintainability", 10),
    ("tooling", 9),
];

/// Total stages in the classic flow.
pub const CLASSIC_TOTAL_STAGES: u32 = 6;

/// Total stages in the deep flow (sum of `DEEP_CATEGORIES` counts).
pub const DEEP_TOTAL_STAGES: u32 = 75;

/// Capacity of the recent-event display log.
pub const RECENT_EVENT_CAP: usize = 25;

/// Which pipeline shape the session is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Six named sommeliers, no categories
    Classic,
    /// 75 techniques across 8 categories
    Deep,
}

impl PipelineMode {
    /// Fixed stage denominator for progress in this mode.
    pub fn total_stages(&self) -> u32 {
        match self {
            PipelineMode::Classic => CLASSIC_TOTAL_STAGES,
            PipelineMode::Deep => DEEP_TOTAL_STAGES,
        }
    }
}

/// Lifecycle status of one pipeline stage.
///
/// Only moves forward along `Queued -> Running -> {Complete|Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Queued,
    Running,
    Complete,
    Error,
}

impl StageStatus {
    /// Whether no further transitions are allowed for this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Complete | StageStatus::Error)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Queued => write!(f, "queued"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Complete => write!(f, "complete"),
            StageStatus::Error => write!(f, "error"),
        }
    }
}

/// Lifecycle status of a technique category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Pending,
    Running,
    Complete,
}

/// Coarse phase of the evaluation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPhase {
    /// Repository enrichment before any stage runs
    Enrichment,
    /// Stage execution (sommeliers or techniques)
    Stages,
    /// Cross-stage synthesis
    Synthesis,
    /// Final quality gate after synthesis
    QualityGate,
    /// Terminal success
    Complete,
    /// Terminal failure
    Error,
}

/// One pipeline step: a sommelier in the classic flow, a technique in the
/// deep flow. Created on first observation, mutated in place by later
/// events for the same id, never deleted while the session is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stable stage identifier
    pub id: String,
    /// Human-readable name for display
    pub display_name: String,
    /// Owning category (deep flow only)
    pub category_id: Option<String>,
    /// Forward-only lifecycle status
    pub status: StageStatus,
    /// Score reported on completion
    pub score: Option<f64>,
    /// Error message reported on failure
    pub error_message: Option<String>,
    /// Wall-clock duration reported on completion
    pub duration_ms: Option<u64>,
    /// Observation ordinal for timeline ordering
    pub step: Option<u32>,
}

impl StageRecord {
    /// Create a queued record for a newly observed stage.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            category_id: None,
            status: StageStatus::Queued,
            score: None,
            error_message: None,
            duration_ms: None,
            step: None,
        }
    }

    /// Attach the owning category.
    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }
}

/// Grouping of stages in the deep flow. `completed_count` never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    /// Stable category identifier
    pub id: String,
    /// Completed stages observed under this category
    pub completed_count: u32,
    /// Fixed technique count for known categories, 0 for unexpected ids
    pub total_count: u32,
    /// Lifecycle status
    pub status: CategoryStatus,
    /// Observation ordinal for timeline ordering
    pub step: Option<u32>,
}

impl CategoryRecord {
    /// Create a pending record for a newly observed category.
    ///
    /// Unexpected category ids are tracked with a zero total; they never
    /// contribute to the progress denominator.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let total_count = Self::known_total(&id).unwrap_or(0);
        Self {
            id,
            completed_count: 0,
            total_count,
            status: CategoryStatus::Pending,
            step: None,
        }
    }

    /// Fixed technique count for a known deep-flow category.
    pub fn known_total(id: &str) -> Option<u32> {
        DEEP_CATEGORIES
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, total)| *total)
    }
}

/// Entry in the bounded recent-event display log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentEvent {
    /// Event kind label
    pub kind: String,
    /// Short human-readable detail
    pub detail: Option<String>,
    /// Wire timestamp if present
    pub timestamp: Option<DateTime<Utc>>,
}

/// The reconciler's complete output after folding all events seen so far.
///
/// Each fold produces a new snapshot value; readers never observe a
/// half-updated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Evaluation run identifier
    pub session_id: String,
    /// Coarse pipeline phase
    pub phase: EvaluationPhase,
    /// Pipeline shape, inferred from the first stage-bearing event
    pub mode: Option<PipelineMode>,
    /// Stage records keyed by id (ordered for deterministic iteration)
    pub stages: BTreeMap<String, StageRecord>,
    /// Category records keyed by id (deep flow only)
    pub categories: BTreeMap<String, CategoryRecord>,
    /// Stages completed successfully
    pub completed_count: u32,
    /// Stages that failed
    pub failed_count: u32,
    /// Monotone display percentage, capped at 99 until terminal
    pub progress_percent: u8,
    /// Whether a terminal event has been folded
    pub terminal: bool,
    /// Final score from synthesis or session completion
    pub final_score: Option<f64>,
    /// Session-level error message (terminal failure)
    pub error: Option<String>,
    /// Status of the synthesis step
    pub synthesis_status: StageStatus,
    /// Observation ordinal of the synthesis step
    pub synthesis_step: Option<u32>,
    /// Aggregate token usage reported by completion events
    pub tokens_used: u64,
    /// Aggregate cost reported by completion events
    pub cost_usd: f64,
    /// Most-recent-first display log, capped at `RECENT_EVENT_CAP`.
    /// Not authoritative; UI only.
    pub recent_events: VecDeque<RecentEvent>,
    /// Next observation ordinal to hand out (step 0 is the start node)
    pub next_step: u32,
}

impl SessionSnapshot {
    /// Create the initial snapshot for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: EvaluationPhase::Enrichment,
            mode: None,
            stages: BTreeMap::new(),
            categories: BTreeMap::new(),
            completed_count: 0,
            failed_count: 0,
            progress_percent: 0,
            terminal: false,
            final_score: None,
            error: None,
            synthesis_status: StageStatus::Queued,
            synthesis_step: None,
            tokens_used: 0,
            cost_usd: 0.0,
            recent_events: VecDeque::new(),
            next_step: 1,
        }
    }

    /// Fixed progress denominator for the inferred mode.
    ///
    /// Classic is assumed until a category-bearing event proves otherwise;
    /// both denominators start from the mode decided at inference and never
    /// shrink from missing events.
    pub fn total_stages(&self) -> u32 {
        self.mode.unwrap_or(PipelineMode::Classic).total_stages()
    }

    /// Whether any stage (or the synthesis step) is actively running.
    pub fn has_active_stage(&self) -> bool {
        self.synthesis_status == StageStatus::Running
            || self.stages.values().any(|s| s.status == StageStatus::Running)
    }

    /// Push an entry onto the recent-event log, most recent first.
    pub fn push_recent(&mut self, entry: RecentEvent) {
        self.recent_events.push_front(entry);
        self.recent_events.truncate(RECENT_EVENT_CAP);
    }

    /// Highest observation ordinal handed out so far (0 = start only).
    pub fn max_step(&self) -> u32 {
        self.next_step.saturating_sub(1)
    }
}
