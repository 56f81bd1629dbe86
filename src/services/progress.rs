//! Progress Calculation
//!
//! Derives the displayed completion percentage from reconciled counts.
//! The display value is monotone and capped at 99 until the session is
//! actually terminal.

/// Cap applied to every pre-terminal percentage.
pub const PRE_TERMINAL_CAP: u8 = 99;

/// Flat bonus shown while a stage is actively running, so the bar visibly
/// advances between completions.
pub const IN_FLIGHT_BONUS: u8 = 5;

/// Derives display percentages from `(completed, total, has_active_stage)`.
#[derive(Debug, Default)]
pub struct ProgressCalculator;

impl ProgressCalculator {
    /// Rounded base percentage from completion counts.
    pub fn base_percent(completed: u32, total: u32) -> u8 {
        if total == 0 {
            return 0;
        }
        let percent = (completed as f64 / total as f64 * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }

    /// Locally computed display percentage.
    ///
    /// Adds the in-flight bonus while a stage is running, caps at 99, and
    /// never returns less than `previous`.
    pub fn display_percent(completed: u32, total: u32, has_active_stage: bool, previous: u8) -> u8 {
        let mut percent = Self::base_percent(completed, total);
        if has_active_stage {
            percent = percent.saturating_add(IN_FLIGHT_BONUS);
        }
        percent = percent.min(PRE_TERMINAL_CAP);
        percent.max(previous)
    }

    /// Fold in a server-provided percentage.
    ///
    /// The authoritative value wins only when greater than what is already
    /// displayed; the pre-terminal cap still applies.
    pub fn apply_authoritative(previous: u8, reported: u8) -> u8 {
        reported.min(PRE_TERMINAL_CAP).max(previous)
    }
}
