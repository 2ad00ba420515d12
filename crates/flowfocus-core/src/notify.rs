//! Completion notices and sound cues.
//!
//! Backends implement [`Notifier`]. The engine only reaches them through
//! [`Alerts`], which applies the user's enablement flags and swallows
//! backend failures so a broken speaker never stalls the timer.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::NotifyError;
use crate::timer::{SessionConfig, SessionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    Start,
    Pause,
    Complete,
}

/// Desktop notice shown when a session finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionNotice {
    pub title: &'static str,
    pub body: &'static str,
}

impl CompletionNotice {
    /// Notice for the session that just finished.
    pub fn for_finished(session_type: SessionType) -> Self {
        match session_type {
            SessionType::Focus => Self {
                title: "Focus Session Complete!",
                body: "Time for a break!",
            },
            SessionType::ShortBreak => Self {
                title: "Short Break Complete!",
                body: "Time to focus again!",
            },
            SessionType::LongBreak => Self {
                title: "Long Break Complete!",
                body: "Time to focus again!",
            },
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &CompletionNotice) -> Result<(), NotifyError>;
    fn play_cue(&self, cue: Cue, volume: u8) -> Result<(), NotifyError>;
}

/// Writes notices and cues to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &CompletionNotice) -> Result<(), NotifyError> {
        info!(title = notice.title, body = notice.body, "session notice");
        Ok(())
    }

    fn play_cue(&self, cue: Cue, volume: u8) -> Result<(), NotifyError> {
        info!(?cue, volume, "sound cue");
        Ok(())
    }
}

/// Gated, failure-tolerant front for a [`Notifier`].
#[derive(Clone)]
pub struct Alerts {
    notifier: Arc<dyn Notifier>,
}

impl Alerts {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn cue(&self, config: &SessionConfig, cue: Cue) {
        if !config.sound_enabled {
            return;
        }
        if let Err(e) = self.notifier.play_cue(cue, config.sound_volume) {
            warn!(error = %e, ?cue, "sound cue failed");
        }
    }

    /// Notice plus completion cue for a finished session.
    pub fn session_finished(&self, config: &SessionConfig, finished: SessionType) {
        if config.desktop_notifications {
            let notice = CompletionNotice::for_finished(finished);
            if let Err(e) = self.notifier.notify(&notice) {
                warn!(error = %e, "completion notice failed");
            }
        }
        self.cue(config, Cue::Complete);
    }
}

impl std::fmt::Debug for Alerts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alerts").finish_non_exhaustive()
    }
}
