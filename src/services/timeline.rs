//! Timeline Player
//!
//! Cursor-based replay over the execution graph's observation ordinals.
//! The player never mutates reconciler state; it filters a derived graph by
//! a step cursor so a consumer can scrub history independent of live
//! updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::graph::ExecutionGraph;

/// Base tick length at 1x speed.
const BASE_TICK_MS: u64 = 600;

/// Playback state machine: `Idle -> Playing -> Paused <-> Playing`.
/// `Idle` doubles as the terminal-display state once the session is over
/// and the cursor sits at `max_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Playback speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSpeed {
    Half,
    Normal,
    Double,
}

impl PlaybackSpeed {
    /// Tick interval at this speed (fixed base divided by the multiplier).
    pub fn tick_interval(&self) -> Duration {
        let ms = match self {
            PlaybackSpeed::Half => BASE_TICK_MS * 2,
            PlaybackSpeed::Normal => BASE_TICK_MS,
            PlaybackSpeed::Double => BASE_TICK_MS / 2,
        };
        Duration::from_millis(ms)
    }
}

/// Scrub/replay cursor over `[0, max_step]`.
#[derive(Debug, Clone)]
pub struct TimelinePlayer {
    current_step: u32,
    max_step: u32,
    state: PlaybackState,
    speed: PlaybackSpeed,
}

impl Default for TimelinePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelinePlayer {
    /// New player at step 0, idle, following live.
    pub fn new() -> Self {
        Self {
            current_step: 0,
            max_step: 0,
            state: PlaybackState::Idle,
            speed: PlaybackSpeed::Normal,
        }
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn max_step(&self) -> u32 {
        self.max_step
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    /// Whether the cursor is pinned to the newest observed step.
    pub fn is_following_live(&self) -> bool {
        self.current_step == self.max_step
    }

    /// Move the cursor. Any value outside `[0, max_step]` clamps rather
    /// than errors.
    pub fn set_step(&mut self, step: i64) {
        self.current_step = step.clamp(0, self.max_step as i64) as u32;
    }

    /// Absorb growth of the live graph.
    ///
    /// `max_step` only grows. A cursor pinned to the previous maximum
    /// auto-advances (follow-live); a cursor the consumer scrubbed backward
    /// is preserved.
    pub fn observe(&mut self, graph: &ExecutionGraph) {
        self.observe_max_step(graph.max_step);
    }

    /// Same as `observe`, from a raw step count.
    pub fn observe_max_step(&mut self, new_max: u32) {
        if new_max <= self.max_step {
            return;
        }
        let was_following = self.is_following_live();
        self.max_step = new_max;
        if was_following {
            self.current_step = new_max;
        }
    }

    /// Begin automatic playback. No-op when the cursor is already at the
    /// end; `Idle` is the resting state there.
    pub fn play(&mut self) {
        if self.current_step < self.max_step {
            self.state = PlaybackState::Playing;
        }
    }

    /// Pause automatic playback.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Change the speed multiplier; takes effect on the next tick.
    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.speed = speed;
    }

    /// Advance one step if playing. Auto-stops at `max_step`.
    ///
    /// Synchronous core of the playback loop so tests can drive virtual
    /// time; the async driver calls this on a timer.
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.current_step = (self.current_step + 1).min(self.max_step);
        if self.current_step >= self.max_step {
            self.state = PlaybackState::Idle;
        }
    }

    /// Version of the graph "as of" the current cursor: nodes observed
    /// after the cursor (or not yet observed at all) are flagged
    /// `is_future` for dimmed rendering, never removed.
    pub fn view(&self, graph: &ExecutionGraph) -> ExecutionGraph {
        let mut view = graph.clone();
        for node in &mut view.nodes {
            node.is_future = match node.step {
                Some(step) => step > self.current_step,
                None => true,
            };
        }
        view
    }
}
