//! Full-session integration tests: event folding, graph derivation, and
//! timeline playback through `EvaluationSession`.

use std::time::Duration;

use sommelier_client::models::{
    EvaluationPhase, PipelineMode, StageStatus, DEEP_TOTAL_STAGES,
};
use sommelier_client::services::{ConnectionState, EvaluationSession, PlaybackState};

use crate::common::*;

/// Let the spawned fold and playback tasks catch up with a snapshot the
/// test has already observed.
async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn classic_run_end_to_end() {
    let mut events = Vec::new();
    for id in ["marcel", "isabella", "heinrich", "sofia", "kenji", "amelie"] {
        events.push(stage_start(id));
        events.push(stage_complete(id, 82.0));
    }
    events.push(synthesis_start());
    events.push(synthesis_complete(84.0));
    events.push(session_complete(84.0));

    let session = EvaluationSession::with_transport(ScriptedTransport::single(events), "eval-1");
    let snapshot = session.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.mode, Some(PipelineMode::Classic));
    assert_eq!(snapshot.phase, EvaluationPhase::Complete);
    assert_eq!(snapshot.completed_count, 6);
    assert_eq!(snapshot.failed_count, 0);
    assert_eq!(snapshot.progress_percent, 100);
    assert_eq!(snapshot.final_score, Some(84.0));
    assert!(session.is_terminal());
}

#[tokio::test(start_paused = true)]
async fn deep_run_builds_category_graph() {
    let events = vec![
        technique_start("structure-01", "structure"),
        technique_complete("structure-01", "structure", 78.0),
        technique_start("security-01", "security"),
        technique_complete("security-01", "security", 91.0),
        technique_start("security-02", "security"),
        session_complete(85.0),
    ];

    let session = EvaluationSession::with_transport(ScriptedTransport::single(events), "eval-2");
    let snapshot = session.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.mode, Some(PipelineMode::Deep));
    assert_eq!(snapshot.total_stages(), DEEP_TOTAL_STAGES);

    let graph = session.graph();
    // All eight categories are pre-rendered even before any technique
    // in them is observed.
    for (category, _) in sommelier_client::models::DEEP_CATEGORIES {
        assert!(graph.node(category).is_some(), "missing category {category}");
    }
    // Observed techniques hang off their category
    let node = graph.node("security-01").unwrap();
    assert_eq!(node.status, StageStatus::Complete);
    assert_eq!(node.score, Some(91.0));
    assert!(graph
        .edges
        .iter()
        .any(|e| e.from == "security" && e.to == "security-01"));
    // Unobserved techniques are absent, not placeholder nodes
    assert!(graph.node("security-05").is_none());
    // Category labels carry the per-category tally
    assert!(graph.node("security").unwrap().label.contains("(1/9)"));
}

#[tokio::test(start_paused = true)]
async fn timeline_follows_live_then_scrub_back_is_preserved() {
    let mut events = Vec::new();
    for id in ["marcel", "isabella", "heinrich", "sofia", "kenji", "amelie"] {
        events.push(stage_start(id));
        events.push(stage_complete(id, 80.0));
    }
    events.push(session_complete(80.0));

    let session = EvaluationSession::with_transport(ScriptedTransport::single(events), "eval-3");
    session.wait_for_terminal().await.unwrap();
    settle().await;

    // Cursor followed the live head
    let (cursor, max_step, _) = session.timeline_state();
    assert!(max_step >= 6);
    assert_eq!(cursor, max_step);

    // Scrub back; nodes observed after the cursor render as future
    session.set_timeline_step(2);
    let view = session.timeline_view();
    assert!(!view.node("marcel").unwrap().is_future);
    assert!(!view.node("isabella").unwrap().is_future);
    assert!(view.node("heinrich").unwrap().is_future);
    assert!(view.node("amelie").unwrap().is_future);

    let (cursor, _, state) = session.timeline_state();
    assert_eq!(cursor, 2);
    assert_eq!(state, PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn playback_advances_and_stops_at_the_live_head() {
    let mut events = Vec::new();
    for id in ["marcel", "isabella", "heinrich"] {
        events.push(stage_start(id));
        events.push(stage_complete(id, 75.0));
    }
    events.push(session_complete(75.0));

    let session = EvaluationSession::with_transport(ScriptedTransport::single(events), "eval-4");
    session.wait_for_terminal().await.unwrap();
    settle().await;

    session.set_timeline_step(0);
    session.play();
    assert_eq!(session.timeline_state().2, PlaybackState::Playing);

    // At normal speed each tick lands 600ms apart; give the driver
    // plenty of virtual time to replay the whole run.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let (cursor, max_step, state) = session.timeline_state();
    assert_eq!(cursor, max_step);
    assert_eq!(state, PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn session_error_freezes_the_snapshot() {
    let events = vec![
        stage_start("marcel"),
        stage_complete("marcel", 70.0),
        stage_start("isabella"),
        session_error("pipeline worker crashed"),
    ];

    let session = EvaluationSession::with_transport(ScriptedTransport::single(events), "eval-5");
    let snapshot = session.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.phase, EvaluationPhase::Error);
    assert_eq!(snapshot.error.as_deref(), Some("pipeline worker crashed"));
    // In-flight work keeps its last observed status
    assert_eq!(snapshot.stages["isabella"].status, StageStatus::Running);
    assert_eq!(snapshot.completed_count, 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_mid_run_reaches_the_same_terminal_snapshot() {
    let transport = ScriptedTransport::new(vec![
        Script::StreamThenDrop(vec![
            Ok(stage_start("marcel")),
            Ok(stage_complete("marcel", 88.0)),
            Ok(stage_start("isabella")),
        ]),
        Script::Stream(vec![
            // Server replays from the start; duplicates must be absorbed
            Ok(stage_complete("marcel", 88.0)),
            Ok(stage_complete("isabella", 79.0)),
            Ok(session_complete(83.0)),
        ]),
    ]);

    let session = EvaluationSession::with_transport(transport, "eval-6");
    let snapshot = session.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.completed_count, 2);
    assert_eq!(snapshot.stages["marcel"].status, StageStatus::Complete);
    assert_eq!(snapshot.stages["isabella"].status, StageStatus::Complete);
    assert_eq!(snapshot.final_score, Some(83.0));
    assert_eq!(session.connection_state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn reopen_resets_reconciled_state() {
    let transport = ScriptedTransport::new(vec![Script::Stream(vec![
        Ok(stage_start("marcel")),
        Ok(stage_complete("marcel", 90.0)),
    ])]);

    let mut session = EvaluationSession::with_transport(transport, "eval-7");
    let mut rx = session.snapshot_receiver();
    rx.wait_for(|s| s.completed_count == 1).await.unwrap();

    session.close();
    session.close(); // idempotent

    // A fresh attempt starts from an empty snapshot; the old generation's
    // state does not leak through.
    session.reopen();
    let snapshot = session.snapshot();
    assert!(snapshot.stages.is_empty());
    assert_eq!(snapshot.completed_count, 0);
    assert!(!snapshot.terminal);

    // The scripted transport is exhausted, so the fresh attempt burns its
    // retry budget and fails permanently.
    let mut states = session.connection_receiver();
    states
        .wait_for(|s| *s == ConnectionState::Failed)
        .await
        .unwrap();
}
