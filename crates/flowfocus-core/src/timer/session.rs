use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    Focus,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    /// Wire name used by the persisted record and the overlay protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Focus => "focus",
            SessionType::ShortBreak => "shortBreak",
            SessionType::LongBreak => "longBreak",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "focus" => Ok(SessionType::Focus),
            "shortBreak" => Ok(SessionType::ShortBreak),
            "longBreak" => Ok(SessionType::LongBreak),
            other => Err(ValidationError::UnknownSessionType(other.to_string())),
        }
    }

    pub fn is_break(&self) -> bool {
        !matches!(self, SessionType::Focus)
    }

    /// Human label shown by compact displays.
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionType::Focus => "Focus Time",
            SessionType::ShortBreak => "Short Break",
            SessionType::LongBreak => "Long Break",
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-cycle timer configuration, supplied by the settings collaborator.
///
/// Durations are in seconds. The engine treats a config as immutable and
/// only swaps it wholesale through `update_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub focus_secs: u64,
    pub short_break_secs: u64,
    pub long_break_secs: u64,
    pub sessions_before_long_break: u32,
    pub auto_start_next_session: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    /// Cue volume, 0..=100.
    #[serde(default = "default_volume")]
    pub sound_volume: u8,
    #[serde(default)]
    pub desktop_notifications: bool,
}

fn default_true() -> bool {
    true
}

fn default_volume() -> u8 {
    50
}

impl SessionConfig {
    /// Build a config from minute durations, the unit settings are edited in.
    pub fn from_minutes(focus: u64, short_break: u64, long_break: u64, sessions_before_long_break: u32) -> Self {
        Self {
            focus_secs: focus.saturating_mul(60),
            short_break_secs: short_break.saturating_mul(60),
            long_break_secs: long_break.saturating_mul(60),
            sessions_before_long_break,
            ..Self::default()
        }
        .normalized()
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start_next_session = auto_start;
        self
    }

    /// Clamp values into their valid ranges: at least one session before a
    /// long break, no zero-length sessions, volume at most 100.
    pub fn normalized(mut self) -> Self {
        self.sessions_before_long_break = self.sessions_before_long_break.max(1);
        self.focus_secs = self.focus_secs.max(1);
        self.short_break_secs = self.short_break_secs.max(1);
        self.long_break_secs = self.long_break_secs.max(1);
        self.sound_volume = self.sound_volume.min(100);
        self
    }

    pub fn duration_secs(&self, session_type: SessionType) -> u64 {
        match session_type {
            SessionType::Focus => self.focus_secs,
            SessionType::ShortBreak => self.short_break_secs,
            SessionType::LongBreak => self.long_break_secs,
        }
    }

    /// Upper bound for `time_remaining` in any reachable state.
    pub fn max_duration_secs(&self) -> u64 {
        self.focus_secs
            .max(self.short_break_secs)
            .max(self.long_break_secs)
    }

    /// The break that follows focus session number `session`.
    pub fn break_after(&self, session: u32) -> SessionType {
        let cadence = self.sessions_before_long_break.max(1);
        if session % cadence == 0 {
            SessionType::LongBreak
        } else {
            SessionType::ShortBreak
        }
    }

    /// True when the change would alter the length of any session.
    pub fn durations_differ(&self, other: &SessionConfig) -> bool {
        self.focus_secs != other.focus_secs
            || self.short_break_secs != other.short_break_secs
            || self.long_break_secs != other.long_break_secs
            || self.sessions_before_long_break != other.sessions_before_long_break
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            focus_secs: 25 * 60,
            short_break_secs: 5 * 60,
            long_break_secs: 15 * 60,
            sessions_before_long_break: 4,
            auto_start_next_session: false,
            sound_enabled: true,
            sound_volume: 50,
            desktop_notifications: false,
        }
    }
}
