//! Wall-clock sources and drift-corrected countdown math.
//!
//! Remaining time is never tallied from tick counts. Each running session
//! owns one absolute target instant and every tick recomputes
//! `ceil((target - now) / 1s)`, so a tick that fires late (throttled,
//! suspended host) still reports the true value.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Source of wall-clock time. Shared between the engine and the background
/// ticker thread, hence `Send + Sync`.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Seconds left until `target`, rounded up and clamped at zero.
pub fn remaining_secs(target: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let delta = target - now;
    let micros = delta.num_microseconds().unwrap_or(i64::MAX);
    if micros <= 0 {
        return 0;
    }
    let secs = micros / 1_000_000 + i64::from(micros % 1_000_000 != 0);
    secs as u64
}

/// Holds the single armed target of the running session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftCorrectingClock {
    target: Option<DateTime<Utc>>,
}

impl DriftCorrectingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a countdown of `remaining` seconds starting at `now`, replacing
    /// any previous target. Returns the new target.
    pub fn arm(&mut self, now: DateTime<Utc>, remaining: u64) -> DateTime<Utc> {
        let millis = i64::try_from(remaining.saturating_mul(1000)).unwrap_or(i64::MAX);
        let target = now + Duration::milliseconds(millis);
        self.target = Some(target);
        target
    }

    pub fn disarm(&mut self) -> Option<DateTime<Utc>> {
        self.target.take()
    }

    pub fn target(&self) -> Option<DateTime<Utc>> {
        self.target
    }

    pub fn is_armed(&self) -> bool {
        self.target.is_some()
    }

    /// True when `target` is the currently armed one. Ticks computed for any
    /// other target are stale.
    pub fn is_current(&self, target: DateTime<Utc>) -> bool {
        self.target == Some(target)
    }

    /// Remaining seconds at `now`, or `None` when not armed.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<u64> {
        self.target.map(|t| remaining_secs(t, now))
    }
}
