use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{SessionType, TimerState};

/// Every state change in the engine produces an Event.
/// Front ends print or forward them; the CLI emits them as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        session: u32,
        session_type: SessionType,
        remaining_secs: u64,
        target: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_secs: u64,
        target: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    TimerSkipped {
        from: SessionType,
        to: SessionType,
        session: u32,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    SessionCompleted {
        record: CompletedSession,
        next: SessionType,
        auto_start: bool,
    },
    StateSnapshot {
        state: TimerState,
        target: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
}

/// Payload handed to the record-session sink at every completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub duration_seconds: u64,
    pub completed_at: DateTime<Utc>,
}
