//! Evaluation Session
//!
//! Composition root for one pipeline run: wires the stream connection into
//! the reconciler fold loop and exposes snapshots, the derived execution
//! graph, and the timeline player to presentation code.
//!
//! Snapshots are immutable per version and published over a watch channel;
//! the fold loop is the only writer, so readers never observe a
//! half-updated state.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::event::EvaluationEvent;
use crate::models::graph::ExecutionGraph;
use crate::models::session::SessionSnapshot;
use crate::services::connection::{
    ConnectionState, EventTransport, SseTransport, StreamConnection,
};
use crate::services::graph::ExecutionGraphBuilder;
use crate::services::reconciler::EventReconciler;
use crate::services::timeline::{PlaybackSpeed, PlaybackState, TimelinePlayer};
use crate::utils::config::ApiConfig;
use crate::utils::error::AppResult;

/// One live evaluation run: owns exactly one stream connection and one
/// reconciler fold loop, plus the timeline player beside them.
pub struct EvaluationSession {
    session_id: String,
    transport: Arc<dyn EventTransport>,
    connection: StreamConnection,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    connection_rx: watch::Receiver<ConnectionState>,
    timeline: Arc<Mutex<TimelinePlayer>>,
    cancel: CancellationToken,
}

impl EvaluationSession {
    /// Subscribe to a run over the real SSE transport.
    pub fn connect(config: ApiConfig, session_id: impl Into<String>) -> AppResult<Self> {
        let transport = Arc::new(SseTransport::new(config)?);
        Ok(Self::with_transport(transport, session_id))
    }

    /// Subscribe with an explicit transport (tests feed synthetic events).
    pub fn with_transport(
        transport: Arc<dyn EventTransport>,
        session_id: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        let (connection, snapshot_rx, connection_rx, timeline, cancel) =
            Self::open(transport.clone(), &session_id);
        Self {
            session_id,
            transport,
            connection,
            snapshot_rx,
            connection_rx,
            timeline,
            cancel,
        }
    }

    /// Open one subscription generation: connection task, fold loop, and
    /// playback driver, all scoped to one cancellation token.
    fn open(
        transport: Arc<dyn EventTransport>,
        session_id: &str,
    ) -> (
        StreamConnection,
        watch::Receiver<SessionSnapshot>,
        watch::Receiver<ConnectionState>,
        Arc<Mutex<TimelinePlayer>>,
        CancellationToken,
    ) {
        let (connection, event_rx, connection_rx) =
            StreamConnection::open(transport, session_id);
        let (snapshot_tx, snapshot_rx) =
            watch::channel(EventReconciler::initial(session_id));
        let timeline = Arc::new(Mutex::new(TimelinePlayer::new()));
        let cancel = CancellationToken::new();

        let fold_timeline = timeline.clone();
        let fold_cancel = cancel.clone();
        tokio::spawn(async move {
            run_fold_loop(event_rx, snapshot_tx, fold_timeline, fold_cancel).await;
        });

        let playback_timeline = timeline.clone();
        let playback_cancel = cancel.clone();
        tokio::spawn(async move {
            run_playback(playback_timeline, playback_cancel).await;
        });

        (connection, snapshot_rx, connection_rx, timeline, cancel)
    }

    /// Run identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current snapshot version.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver for snapshot versions (presentation subscribes here).
    pub fn snapshot_receiver(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_rx.borrow()
    }

    /// Receiver for connection-state transitions (reconnect banner).
    pub fn connection_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.connection_rx.clone()
    }

    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.snapshot_rx.borrow().terminal
    }

    /// Execution graph for the current snapshot version.
    pub fn graph(&self) -> ExecutionGraph {
        ExecutionGraphBuilder::build(&self.snapshot_rx.borrow())
    }

    /// Graph "as of" the timeline cursor, future nodes dimmed.
    pub fn timeline_view(&self) -> ExecutionGraph {
        let graph = self.graph();
        let mut player = self.timeline.lock().expect("timeline lock poisoned");
        player.observe(&graph);
        player.view(&graph)
    }

    /// Move the timeline cursor (clamped).
    pub fn set_timeline_step(&self, step: i64) {
        let graph = self.graph();
        let mut player = self.timeline.lock().expect("timeline lock poisoned");
        player.observe(&graph);
        player.set_step(step);
    }

    /// Start automatic timeline playback.
    pub fn play(&self) {
        self.timeline.lock().expect("timeline lock poisoned").play();
    }

    /// Pause automatic timeline playback.
    pub fn pause(&self) {
        self.timeline.lock().expect("timeline lock poisoned").pause();
    }

    /// Change playback speed.
    pub fn set_playback_speed(&self, speed: PlaybackSpeed) {
        self.timeline
            .lock()
            .expect("timeline lock poisoned")
            .set_speed(speed);
    }

    /// Cursor position, newest observed step, and playback state.
    pub fn timeline_state(&self) -> (u32, u32, PlaybackState) {
        let player = self.timeline.lock().expect("timeline lock poisoned");
        (player.current_step(), player.max_step(), player.state())
    }

    /// Block until the run reaches a terminal state and return the final
    /// snapshot. Resolves immediately if already terminal.
    pub async fn wait_for_terminal(&self) -> AppResult<SessionSnapshot> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|s| s.terminal)
            .await
            .map_err(|_| crate::utils::error::AppError::closed(self.session_id.clone()))?;
        Ok(snapshot.clone())
    }

    /// Re-open the subscription for this run as a fresh attempt.
    ///
    /// The still-open prior subscription is closed first, so there is never
    /// more than one live subscription per session. Reconciled state resets;
    /// consumers should re-fetch receivers afterwards. This is the manual
    /// restart path after `Failed` — the client never auto-restarts.
    pub fn reopen(&mut self) {
        debug!(session_id = %self.session_id, "reopening subscription");
        self.close();
        let (connection, snapshot_rx, connection_rx, timeline, cancel) =
            Self::open(self.transport.clone(), &self.session_id);
        self.connection = connection;
        self.snapshot_rx = snapshot_rx;
        self.connection_rx = connection_rx;
        self.timeline = timeline;
        self.cancel = cancel;
    }

    /// Idempotent teardown: synchronously stops the transport, the backoff
    /// timer, and the playback timer. A no-op after terminal.
    pub fn close(&self) {
        self.connection.close();
        self.cancel.cancel();
    }
}

impl Drop for EvaluationSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fold loop: the single snapshot writer. Runs each fold to completion
/// before accepting the next event, giving FIFO-within-connection ordering.
async fn run_fold_loop(
    mut event_rx: mpsc::Receiver<EvaluationEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    timeline: Arc<Mutex<TimelinePlayer>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = event_rx.recv() => match event {
                Some(event) => event,
                None => return,
            },
        };

        let next = {
            let prev = snapshot_tx.borrow().clone();
            EventReconciler::apply(&prev, &event)
        };
        let max_step = next.max_step();
        if snapshot_tx.send(next).is_err() {
            return;
        }
        // Keep a live-following cursor riding the newest step.
        timeline
            .lock()
            .expect("timeline lock poisoned")
            .observe_max_step(max_step);
    }
}

/// Playback driver: ticks the player at its configured speed until the
/// session is closed. Ticks are no-ops unless the player is playing.
async fn run_playback(timeline: Arc<Mutex<TimelinePlayer>>, cancel: CancellationToken) {
    loop {
        let interval = timeline
            .lock()
            .expect("timeline lock poisoned")
            .speed()
            .tick_interval();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                timeline.lock().expect("timeline lock poisoned").tick();
            }
        }
    }
}
