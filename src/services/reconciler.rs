//! Event Reconciler
//!
//! Pure state-transition fold `(snapshot, event) -> snapshot`: the
//! authoritative source of truth for everything downstream. Synchronous,
//! no I/O, no timers, and tolerant of duplicated, out-of-order, or missing
//! events by content rather than by sequence index.

use std::collections::btree_map::Entry;

use tracing::{debug, warn};

use crate::models::event::EvaluationEvent;
use crate::models::session::{
    CategoryRecord, CategoryStatus, EvaluationPhase, PipelineMode, RecentEvent, SessionSnapshot,
    StageRecord, StageStatus,
};
use crate::services::progress::ProgressCalculator;

/// Folds evaluation events into session snapshots.
#[derive(Debug, Default)]
pub struct EventReconciler;

impl EventReconciler {
    /// Initial snapshot for a new session.
    pub fn initial(session_id: impl Into<String>) -> SessionSnapshot {
        SessionSnapshot::new(session_id)
    }

    /// Fold one event into the prior snapshot and return the next one.
    ///
    /// Deterministic: replaying the same event sequence always yields the
    /// same snapshot. Post-terminal events are ignored rather than risking
    /// backward transitions.
    pub fn apply(snapshot: &SessionSnapshot, event: &EvaluationEvent) -> SessionSnapshot {
        if snapshot.terminal {
            debug!(
                session_id = %snapshot.session_id,
                kind = event.kind(),
                "ignoring event after terminal state"
            );
            return snapshot.clone();
        }

        let mut next = snapshot.clone();
        Self::infer_mode(&mut next, event);

        match event {
            EvaluationEvent::StageStart {
                stage_id,
                technique_name,
                category_id,
                timestamp,
            } => {
                Self::advance_phase(&mut next, EvaluationPhase::Stages);
                if let Some(cid) = category_id {
                    Self::mark_category_running(&mut next, cid);
                }
                let record = Self::ensure_stage(
                    &mut next,
                    stage_id,
                    technique_name.as_deref(),
                    category_id.as_deref(),
                );
                // Forward only: a terminal stage absorbs a late/duplicate start.
                if record.status == StageStatus::Queued {
                    record.status = StageStatus::Running;
                }
                Self::recompute_progress(&mut next);
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: Some(stage_id.clone()),
                    timestamp: *timestamp,
                });
            }

            EvaluationEvent::StageComplete {
                stage_id,
                category_id,
                score,
                duration_ms,
                tokens_used,
                cost_usd,
                timestamp,
                ..
            } => {
                Self::advance_phase(&mut next, EvaluationPhase::Stages);
                if let Some(cid) = category_id {
                    Self::mark_category_running(&mut next, cid);
                }
                let record = Self::ensure_stage(&mut next, stage_id, None, category_id.as_deref());
                let already_terminal = record.status.is_terminal();

                // Display fields may refresh even on duplicates.
                if score.is_some() {
                    record.score = *score;
                }
                if duration_ms.is_some() {
                    record.duration_ms = *duration_ms;
                }

                if already_terminal {
                    debug!(stage_id = %stage_id, "duplicate completion absorbed");
                } else {
                    record.status = StageStatus::Complete;
                    let category = record.category_id.clone();
                    Self::count_finished(&mut next, category.as_deref(), false);
                    next.tokens_used += tokens_used.unwrap_or(0);
                    next.cost_usd += cost_usd.unwrap_or(0.0);
                    Self::recompute_progress(&mut next);
                }
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: Some(stage_id.clone()),
                    timestamp: *timestamp,
                });
            }

            EvaluationEvent::StageError {
                stage_id,
                category_id,
                error,
                timestamp,
            } => {
                Self::advance_phase(&mut next, EvaluationPhase::Stages);
                if let Some(cid) = category_id {
                    Self::mark_category_running(&mut next, cid);
                }
                let record = Self::ensure_stage(&mut next, stage_id, None, category_id.as_deref());
                let already_terminal = record.status.is_terminal();

                record.error_message = Some(error.clone());

                if already_terminal {
                    debug!(stage_id = %stage_id, "duplicate stage error absorbed");
                } else {
                    record.status = StageStatus::Error;
                    let category = record.category_id.clone();
                    Self::count_finished(&mut next, category.as_deref(), true);
                    Self::recompute_progress(&mut next);
                }
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: Some(format!("{}: {}", stage_id, error)),
                    timestamp: *timestamp,
                });
            }

            EvaluationEvent::CategoryStart {
                category_id,
                timestamp,
            } => {
                Self::advance_phase(&mut next, EvaluationPhase::Stages);
                Self::mark_category_running(&mut next, category_id);
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: Some(category_id.clone()),
                    timestamp: *timestamp,
                });
            }

            EvaluationEvent::CategoryComplete {
                category_id,
                timestamp,
            } => {
                // Only a newly observed category takes an ordinal; a
                // duplicate completion must not inflate the step count.
                let step = if next.categories.contains_key(category_id) {
                    None
                } else {
                    Some(Self::take_step(&mut next))
                };
                let category = next
                    .categories
                    .entry(category_id.clone())
                    .or_insert_with(|| CategoryRecord::new(category_id.clone()));
                if category.step.is_none() {
                    category.step = step;
                }
                category.status = CategoryStatus::Complete;
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: Some(category_id.clone()),
                    timestamp: *timestamp,
                });
            }

            EvaluationEvent::SynthesisStart { timestamp } => {
                Self::advance_phase(&mut next, EvaluationPhase::Synthesis);
                if next.synthesis_status == StageStatus::Queued {
                    next.synthesis_status = StageStatus::Running;
                    let step = Self::take_step(&mut next);
                    next.synthesis_step.get_or_insert(step);
                }
                Self::recompute_progress(&mut next);
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: None,
                    timestamp: *timestamp,
                });
            }

            EvaluationEvent::SynthesisComplete {
                score, timestamp, ..
            } => {
                Self::advance_phase(&mut next, EvaluationPhase::QualityGate);
                if !next.synthesis_status.is_terminal() {
                    next.synthesis_status = StageStatus::Complete;
                    if next.synthesis_step.is_none() {
                        let step = Self::take_step(&mut next);
                        next.synthesis_step = Some(step);
                    }
                }
                if score.is_some() {
                    next.final_score = *score;
                }
                Self::recompute_progress(&mut next);
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: None,
                    timestamp: *timestamp,
                });
            }

            EvaluationEvent::Heartbeat {
                progress_percent, ..
            } => {
                // Keepalives are not recorded in the display log.
                if let Some(reported) = progress_percent {
                    next.progress_percent =
                        ProgressCalculator::apply_authoritative(next.progress_percent, *reported);
                }
            }

            EvaluationEvent::SessionComplete {
                score,
                tokens_used,
                cost_usd,
                timestamp,
                ..
            } => {
                next.terminal = true;
                next.phase = EvaluationPhase::Complete;
                next.progress_percent = 100;
                if score.is_some() {
                    next.final_score = *score;
                }
                next.tokens_used += tokens_used.unwrap_or(0);
                next.cost_usd += cost_usd.unwrap_or(0.0);
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: None,
                    timestamp: *timestamp,
                });
            }

            EvaluationEvent::SessionError { error, timestamp } => {
                next.terminal = true;
                next.phase = EvaluationPhase::Error;
                next.error = Some(error.clone());
                // Progress freezes at its last displayed value.
                next.push_recent(RecentEvent {
                    kind: event.kind().to_string(),
                    detail: Some(error.clone()),
                    timestamp: *timestamp,
                });
            }
        }

        next
    }

    /// Decide the pipeline shape from the first stage- or category-bearing
    /// event. Totals are frozen here; later events never change them.
    fn infer_mode(snapshot: &mut SessionSnapshot, event: &EvaluationEvent) {
        if snapshot.mode.is_some() {
            return;
        }
        let mode = match event {
            EvaluationEvent::CategoryStart { .. } | EvaluationEvent::CategoryComplete { .. } => {
                Some(PipelineMode::Deep)
            }
            EvaluationEvent::StageStart { category_id, .. }
            | EvaluationEvent::StageComplete { category_id, .. }
            | EvaluationEvent::StageError { category_id, .. } => Some(if category_id.is_some() {
                PipelineMode::Deep
            } else {
                PipelineMode::Classic
            }),
            _ => None,
        };
        if let Some(mode) = mode {
            debug!(session_id = %snapshot.session_id, ?mode, "pipeline mode inferred");
            snapshot.mode = Some(mode);
        }
    }

    /// Get or create the record for a stage id, assigning its observation
    /// ordinal on first sight. Tolerates completions for stages whose start
    /// event was dropped.
    fn ensure_stage<'a>(
        snapshot: &'a mut SessionSnapshot,
        stage_id: &str,
        display_name: Option<&str>,
        category_id: Option<&str>,
    ) -> &'a mut StageRecord {
        let next_step = &mut snapshot.next_step;
        match snapshot.stages.entry(stage_id.to_string()) {
            Entry::Vacant(slot) => {
                let name = display_name
                    .map(str::to_string)
                    .unwrap_or_else(|| title_case(stage_id));
                let mut record = StageRecord::new(stage_id, name);
                if let Some(cid) = category_id {
                    record = record.with_category(cid);
                }
                record.step = Some(*next_step);
                *next_step += 1;
                slot.insert(record)
            }
            Entry::Occupied(slot) => {
                let record = slot.into_mut();
                if let Some(cid) = category_id {
                    // A later event may fill in a category the start omitted.
                    record.category_id.get_or_insert_with(|| cid.to_string());
                }
                record
            }
        }
    }

    /// Hand out the next observation ordinal.
    fn take_step(snapshot: &mut SessionSnapshot) -> u32 {
        let step = snapshot.next_step;
        snapshot.next_step += 1;
        step
    }

    /// Record one finished stage, keeping aggregate and per-category counts
    /// within their fixed totals.
    fn count_finished(snapshot: &mut SessionSnapshot, category_id: Option<&str>, failed: bool) {
        let total = snapshot.total_stages();
        if snapshot.completed_count + snapshot.failed_count < total {
            if failed {
                snapshot.failed_count += 1;
            } else {
                snapshot.completed_count += 1;
            }
        } else {
            warn!(
                session_id = %snapshot.session_id,
                total,
                "finished-stage count already at mode total; not incrementing"
            );
        }

        if let (Some(cid), false) = (category_id, failed) {
            if let Some(category) = snapshot.categories.get_mut(cid) {
                // Unexpected categories have a zero total; their record is
                // tracked (status, step) but never counts.
                if category.completed_count < category.total_count {
                    category.completed_count += 1;
                }
                if category.total_count > 0 && category.completed_count >= category.total_count {
                    category.status = CategoryStatus::Complete;
                }
            }
        }
    }

    /// Get or create a category record and move it to running.
    fn mark_category_running(snapshot: &mut SessionSnapshot, category_id: &str) {
        let step = if snapshot.categories.contains_key(category_id) {
            None
        } else {
            Some(Self::take_step(snapshot))
        };
        let category = snapshot
            .categories
            .entry(category_id.to_string())
            .or_insert_with(|| CategoryRecord::new(category_id));
        if category.step.is_none() {
            category.step = step;
        }
        if category.status == CategoryStatus::Pending {
            category.status = CategoryStatus::Running;
        }
    }

    /// Move the coarse phase forward; never backward.
    fn advance_phase(snapshot: &mut SessionSnapshot, target: EvaluationPhase) {
        if phase_rank(target) > phase_rank(snapshot.phase) {
            snapshot.phase = target;
        }
    }

    /// Recompute the display percentage from current counts, preserving
    /// monotonicity against the previous value.
    fn recompute_progress(snapshot: &mut SessionSnapshot) {
        snapshot.progress_percent = ProgressCalculator::display_percent(
            snapshot.completed_count,
            snapshot.total_stages(),
            snapshot.has_active_stage(),
            snapshot.progress_percent,
        );
    }
}

fn phase_rank(phase: EvaluationPhase) -> u8 {
    match phase {
        EvaluationPhase::Enrichment => 0,
        EvaluationPhase::Stages => 1,
        EvaluationPhase::Synthesis => 2,
        EvaluationPhase::QualityGate => 3,
        EvaluationPhase::Complete => 4,
        EvaluationPhase::Error => 4,
    }
}

/// Uppercase the first letter of an id for display ("marcel" -> "Marcel").
fn title_case(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
