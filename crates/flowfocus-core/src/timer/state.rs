//! The timer snapshot and its persisted/wire shape.
//!
//! Internally the run state is a single three-valued [`RunPhase`]. The
//! `isRunning`/`isPaused` boolean pair only exists at the record boundary:
//!
//! | phase   | isRunning | isPaused |
//! |---------|-----------|----------|
//! | Idle    | false     | false    |
//! | Running | true      | false    |
//! | Paused  | true      | true     |
//!
//! When reading, `isPaused = true` wins regardless of `isRunning`, so the
//! otherwise meaningless `(false, true)` combination resumes as Paused.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::session::{SessionConfig, SessionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
}

impl RunPhase {
    pub fn from_flags(is_running: bool, is_paused: bool) -> Self {
        match (is_running, is_paused) {
            (_, true) => RunPhase::Paused,
            (true, false) => RunPhase::Running,
            (false, false) => RunPhase::Idle,
        }
    }
}

/// The sole mutable entity of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TimerRecord", from = "TimerRecord")]
pub struct TimerState {
    pub phase: RunPhase,
    /// Seconds left in the current session.
    pub time_remaining: u64,
    /// 1-based focus session counter.
    pub current_session: u32,
    pub current_session_type: SessionType,
    pub last_updated: DateTime<Utc>,
}

impl TimerState {
    /// Fresh state: focus session 1, full focus duration, idle.
    pub fn initial(config: &SessionConfig, now: DateTime<Utc>) -> Self {
        Self {
            phase: RunPhase::Idle,
            time_remaining: config.duration_secs(SessionType::Focus),
            current_session: 1,
            current_session_type: SessionType::Focus,
            last_updated: now,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, RunPhase::Running | RunPhase::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.phase == RunPhase::Paused
    }

    /// Running and not paused: the only phase in which time elapses.
    pub fn is_counting(&self) -> bool {
        self.phase == RunPhase::Running
    }

    /// Local calendar day the snapshot belongs to.
    pub fn day(&self) -> NaiveDate {
        self.last_updated.with_timezone(&Local).date_naive()
    }

    /// 0.0 ..= 100.0 progress through the current session.
    pub fn progress(&self, config: &SessionConfig) -> f64 {
        let total = config.duration_secs(self.current_session_type);
        if total == 0 {
            return 0.0;
        }
        let done = total.saturating_sub(self.time_remaining) as f64;
        (done / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Persisted record layout, one JSON object under a stable key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub is_running: bool,
    pub is_paused: bool,
    pub time_remaining: u64,
    pub current_session: u32,
    pub current_session_type: SessionType,
    pub last_updated: DateTime<Utc>,
}

impl From<TimerState> for TimerRecord {
    fn from(state: TimerState) -> Self {
        Self {
            is_running: state.is_running(),
            is_paused: state.is_paused(),
            time_remaining: state.time_remaining,
            current_session: state.current_session,
            current_session_type: state.current_session_type,
            last_updated: state.last_updated,
        }
    }
}

impl From<TimerRecord> for TimerState {
    fn from(record: TimerRecord) -> Self {
        Self {
            phase: RunPhase::from_flags(record.is_running, record.is_paused),
            time_remaining: record.time_remaining,
            current_session: record.current_session.max(1),
            current_session_type: record.current_session_type,
            last_updated: record.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_flag_mapping() {
        assert_eq!(RunPhase::from_flags(false, false), RunPhase::Idle);
        assert_eq!(RunPhase::from_flags(true, false), RunPhase::Running);
        assert_eq!(RunPhase::from_flags(true, true), RunPhase::Paused);
        assert_eq!(RunPhase::from_flags(false, true), RunPhase::Paused);
    }

    #[test]
    fn serializes_as_record() {
        let now = Utc::now();
        let mut state = TimerState::initial(&SessionConfig::default(), now);
        state.phase = RunPhase::Paused;
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isRunning"], true);
        assert_eq!(json["isPaused"], true);
        assert_eq!(json["timeRemaining"], 1500);
        assert_eq!(json["currentSession"], 1);
        assert_eq!(json["currentSessionType"], "focus");
        assert!(json["lastUpdated"].is_string());

        let back: TimerState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn progress_is_clamped() {
        let cfg = SessionConfig::default();
        let mut state = TimerState::initial(&cfg, Utc::now());
        assert_eq!(state.progress(&cfg), 0.0);
        state.time_remaining = 750;
        assert!((state.progress(&cfg) - 50.0).abs() < f64::EPSILON);
        state.time_remaining = 0;
        assert_eq!(state.progress(&cfg), 100.0);
    }
}
