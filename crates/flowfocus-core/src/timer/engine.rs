//! Session state machine.
//!
//! The machine is synchronous and owns no threads or timers: callers pass
//! the current wall-clock instant into every command, and feed it ticks that
//! name the target they were computed for. [`crate::timer::TimerEngine`]
//! wraps it with the scheduling; the CLI drives it directly for one-shot
//! commands.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start--> Running --pause--> Paused --resume--> Running
//!   ^                |                  |
//!   +----reset-------+------reset-------+
//!
//! Running --(remaining hits 0)--> next session (Idle, or Running when
//!                                 auto-start is on)
//! any --skip--> next session
//! ```
//!
//! Session cycle: `Focus -> ShortBreak | LongBreak -> Focus`, the session
//! counter advancing when a break ends.
//!
//! ## Usage
//!
//! ```ignore
//! let mut machine = SessionStateMachine::new(config, state);
//! machine.start(clock.now());
//! // On every tick:
//! machine.tick(target, clock.now()); // Completed(..) when the session ends
//! ```

use chrono::{DateTime, Utc};

use super::clock::DriftCorrectingClock;
use super::session::{SessionConfig, SessionType};
use super::state::{RunPhase, TimerState};
use crate::events::{CompletedSession, Event};

/// Result of applying one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Tick was computed for a target that is no longer armed.
    Stale,
    /// Remaining time did not change (sub-second tick).
    Unchanged,
    /// Remaining time moved to the contained value.
    Updated(u64),
    /// The session finished; contains the `SessionCompleted` event.
    Completed(Event),
}

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    config: SessionConfig,
    state: TimerState,
    clock: DriftCorrectingClock,
    /// Target whose completion side effects already fired.
    last_completed: Option<DateTime<Utc>>,
}

impl SessionStateMachine {
    /// Wrap an existing (possibly recovered) state. Remaining time is clamped
    /// to the duration of its session type.
    pub fn new(config: SessionConfig, mut state: TimerState) -> Self {
        let config = config.normalized();
        state.time_remaining = state
            .time_remaining
            .min(config.duration_secs(state.current_session_type));
        state.current_session = state.current_session.max(1);
        Self {
            config,
            state,
            clock: DriftCorrectingClock::new(),
            last_completed: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The armed target instant, if a countdown is live.
    pub fn target(&self) -> Option<DateTime<Utc>> {
        self.clock.target()
    }

    /// Running with a live countdown.
    pub fn is_armed(&self) -> bool {
        self.state.is_counting() && self.clock.is_armed()
    }

    /// Running but waiting for the countdown to be armed (the short gap
    /// between a completion and its auto-start, or a freshly recovered
    /// running snapshot).
    pub fn awaiting_arm(&self) -> bool {
        self.state.is_counting() && !self.clock.is_armed()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Event {
        Event::StateSnapshot {
            state: self.state.clone(),
            target: self.clock.target(),
            at: now,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm the countdown from the current `time_remaining`.
    ///
    /// No-op when already running with a live countdown.
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.is_armed() {
            return None;
        }
        let was_paused = self.state.phase == RunPhase::Paused;
        self.clock.disarm();
        let target = self.clock.arm(now, self.state.time_remaining);
        self.state.phase = RunPhase::Running;
        self.state.last_updated = now;

        if was_paused {
            Some(Event::TimerResumed {
                remaining_secs: self.state.time_remaining,
                target,
                at: now,
            })
        } else {
            Some(Event::TimerStarted {
                session: self.state.current_session,
                session_type: self.state.current_session_type,
                remaining_secs: self.state.time_remaining,
                target,
                at: now,
            })
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.state.phase != RunPhase::Running {
            return None;
        }
        if let Some(remaining) = self.clock.remaining_at(now) {
            self.state.time_remaining = self.clamp(remaining);
        }
        self.clock.disarm();
        self.state.phase = RunPhase::Paused;
        self.state.last_updated = now;
        Some(Event::TimerPaused {
            remaining_secs: self.state.time_remaining,
            at: now,
        })
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<Event> {
        match self.state.phase {
            RunPhase::Paused => self.start(now),
            _ => None,
        }
    }

    /// Jump to the next session regardless of remaining time.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Event {
        self.clock.disarm();
        let from = self.state.current_session_type;
        self.advance(now);
        if self.state.is_counting() {
            self.clock.arm(now, self.state.time_remaining);
        }
        Event::TimerSkipped {
            from,
            to: self.state.current_session_type,
            session: self.state.current_session,
            at: now,
        }
    }

    pub fn reset(&mut self, now: DateTime<Utc>) -> Event {
        self.clock.disarm();
        self.state = TimerState::initial(&self.config, now);
        Event::TimerReset { at: now }
    }

    /// Apply a tick computed for `target`. Remaining time is always
    /// recomputed from `now`, never taken from the tick's own count.
    pub fn tick(&mut self, target: DateTime<Utc>, now: DateTime<Utc>) -> TickOutcome {
        if !self.state.is_counting() || !self.clock.is_current(target) {
            return TickOutcome::Stale;
        }
        let remaining = self.clamp(self.clock.remaining_at(now).unwrap_or(0));
        if remaining == 0 {
            return match self.complete(target, now) {
                Some(event) => TickOutcome::Completed(event),
                None => TickOutcome::Stale,
            };
        }
        if remaining == self.state.time_remaining {
            return TickOutcome::Unchanged;
        }
        self.state.time_remaining = remaining;
        self.state.last_updated = now;
        TickOutcome::Updated(remaining)
    }

    /// Recompute against the armed target, if any.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> TickOutcome {
        match self.clock.target() {
            Some(target) => self.tick(target, now),
            None => TickOutcome::Stale,
        }
    }

    /// Finish the session armed with `target`.
    ///
    /// Fires at most once per target: a second call for the same target, or
    /// a call for a target that is no longer armed, returns `None`.
    fn complete(&mut self, target: DateTime<Utc>, now: DateTime<Utc>) -> Option<Event> {
        if self.last_completed == Some(target) || !self.clock.is_current(target) {
            return None;
        }
        self.clock.disarm();
        self.last_completed = Some(target);

        let finished = self.state.current_session_type;
        let record = CompletedSession {
            session_type: finished,
            duration_seconds: self.config.duration_secs(finished),
            completed_at: now,
        };
        self.advance(now);
        Some(Event::SessionCompleted {
            record,
            next: self.state.current_session_type,
            auto_start: self.config.auto_start_next_session,
        })
    }

    /// Swap in a new config. When durations changed and the timer is not
    /// counting down, the current session is re-seeded with its new length.
    /// A running countdown longer than its new duration is shortened.
    ///
    /// Returns true when the armed target moved.
    pub fn update_config(&mut self, config: SessionConfig, now: DateTime<Utc>) -> bool {
        let config = config.normalized();
        let changed = self.config.durations_differ(&config);
        self.config = config;
        if !changed {
            return false;
        }

        let duration = self.config.duration_secs(self.state.current_session_type);
        if !self.state.is_counting() {
            self.state.time_remaining = duration;
            self.state.last_updated = now;
            return false;
        }

        let remaining = self
            .clock
            .remaining_at(now)
            .unwrap_or(self.state.time_remaining);
        self.state.time_remaining = remaining.min(duration);
        self.state.last_updated = now;
        if remaining > duration && self.clock.is_armed() {
            self.clock.arm(now, duration);
            return true;
        }
        false
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Move to the next session of the cycle.
    fn advance(&mut self, now: DateTime<Utc>) {
        let (next_type, next_session) = match self.state.current_session_type {
            SessionType::Focus => (
                self.config.break_after(self.state.current_session),
                self.state.current_session,
            ),
            SessionType::ShortBreak | SessionType::LongBreak => {
                (SessionType::Focus, self.state.current_session.saturating_add(1))
            }
        };
        self.state.current_session_type = next_type;
        self.state.current_session = next_session;
        self.state.time_remaining = self.config.duration_secs(next_type);
        self.state.phase = if self.config.auto_start_next_session {
            RunPhase::Running
        } else {
            RunPhase::Idle
        };
        self.state.last_updated = now;
    }

    fn clamp(&self, remaining: u64) -> u64 {
        remaining.min(self.config.duration_secs(self.state.current_session_type))
    }
}
