//! Durable timer snapshot.
//!
//! One JSON record under [`SNAPSHOT_KEY`]. Writes never fail outward, and
//! reads tolerate partial or corrupted records field by field, so a bad
//! record degrades to defaults instead of blocking startup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::KvStore;
use crate::error::StorageError;
use crate::timer::{RunPhase, SessionConfig, SessionStateMachine, SessionType, TimerState};

/// Stable key of the snapshot record.
pub const SNAPSHOT_KEY: &str = "pomodoroState";

/// Suffix of the key holding the config a snapshot was computed under.
const CONFIG_SUFFIX: &str = ".config";

/// A decoded snapshot and the local calendar day it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSnapshot {
    pub state: TimerState,
    pub day: NaiveDate,
}

pub struct PersistenceStore {
    backend: Box<dyn KvStore>,
    key: String,
    config_key: String,
}

impl PersistenceStore {
    pub fn new(backend: impl KvStore + 'static) -> Self {
        Self::with_key(backend, SNAPSHOT_KEY)
    }

    pub fn with_key(backend: impl KvStore + 'static, key: &str) -> Self {
        Self {
            backend: Box::new(backend),
            key: key.to_string(),
            config_key: format!("{key}{CONFIG_SUFFIX}"),
        }
    }

    /// Serialize and store `state`. Failures are logged and swallowed.
    pub fn write(&self, state: &TimerState) {
        let json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize timer snapshot");
                return;
            }
        };
        if let Err(e) = self.backend.kv_set(&self.key, &json) {
            warn!(error = %e, "failed to persist timer snapshot");
        }
    }

    /// Remember the config the stored snapshot is computed under. Failures
    /// are logged and swallowed.
    pub fn write_config(&self, config: &SessionConfig) {
        let json = match serde_json::to_string(config) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize session config");
                return;
            }
        };
        if let Err(e) = self.backend.kv_set(&self.config_key, &json) {
            warn!(error = %e, "failed to persist session config");
        }
    }

    /// The config recorded by [`Self::write_config`], if it is readable.
    pub fn read_config(&self) -> Option<SessionConfig> {
        let raw = match self.backend.kv_get(&self.config_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "session config storage unavailable");
                return None;
            }
        };
        match serde_json::from_str::<SessionConfig>(&raw) {
            Ok(config) => Some(config.normalized()),
            Err(e) => {
                warn!(error = %e, "discarding unreadable session config");
                None
            }
        }
    }

    /// Load the last snapshot. `config` supplies defaults for fields that
    /// are missing or malformed.
    pub fn read(&self, config: &SessionConfig) -> Option<PersistedSnapshot> {
        let raw = match self.backend.kv_get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "timer snapshot storage unavailable");
                return None;
            }
        };
        let state = decode_snapshot(&raw, config)?;
        Some(PersistedSnapshot {
            day: state.day(),
            state,
        })
    }

    /// Build the starting state for an engine created at `now`.
    ///
    /// A snapshot from today is adopted; if it was counting down, the time
    /// elapsed since it was written is subtracted. Anything else (no record,
    /// unreadable record, another day) yields a fresh focus session.
    pub fn recover(&self, now: DateTime<Utc>, config: &SessionConfig) -> TimerState {
        let today = now.with_timezone(&Local).date_naive();
        match self.read(config) {
            Some(snapshot) if snapshot.day == today => {
                let mut state = snapshot.state;
                if state.is_counting() {
                    let elapsed = (now - state.last_updated).num_seconds().max(0) as u64;
                    state.time_remaining = state.time_remaining.saturating_sub(elapsed);
                    state.last_updated = now;
                    debug!(elapsed, remaining = state.time_remaining, "recovered running timer");
                }
                state
            }
            Some(snapshot) => {
                debug!(day = %snapshot.day, "discarding snapshot from another day");
                TimerState::initial(config, now)
            }
            None => TimerState::initial(config, now),
        }
    }

    /// Recover a state machine running under `config`.
    ///
    /// The snapshot is decoded against the config it was written under, then
    /// moved to `config` the same way a live settings change would be, so an
    /// idle or paused session whose length changed while nothing was running
    /// is re-seeded.
    pub fn restore(&self, now: DateTime<Utc>, config: &SessionConfig) -> SessionStateMachine {
        let config = config.clone().normalized();
        let previous = self.read_config().unwrap_or_else(|| config.clone());
        let state = self.recover(now, &previous);
        let mut machine = SessionStateMachine::new(previous, state);
        machine.update_config(config, now);
        machine
    }
}

/// Decode a snapshot record, substituting defaults for bad fields.
///
/// Returns `None` only when the payload is not a JSON object or carries no
/// usable `lastUpdated`, since without it the record cannot be placed on a
/// calendar day.
pub fn decode_snapshot(raw: &str, config: &SessionConfig) -> Option<TimerState> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "timer snapshot is not valid JSON");
            return None;
        }
    };
    let Some(obj) = value.as_object() else {
        warn!("timer snapshot is not a JSON object");
        return None;
    };

    let Some(last_updated) = obj
        .get("lastUpdated")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
    else {
        warn!("timer snapshot has no readable lastUpdated");
        return None;
    };

    let is_running = bool_field(obj, "isRunning");
    let is_paused = bool_field(obj, "isPaused");

    let session_type = match obj.get("currentSessionType").and_then(Value::as_str) {
        Some(name) => SessionType::parse(name).unwrap_or_else(|e| {
            warn!(error = %e, "substituting focus for bad session type");
            SessionType::Focus
        }),
        None => SessionType::Focus,
    };

    let duration = config.duration_secs(session_type);
    let time_remaining = match obj.get("timeRemaining").and_then(Value::as_f64) {
        Some(secs) if secs.is_finite() && secs >= 0.0 => (secs.floor() as u64).min(duration),
        _ => {
            warn!("substituting full duration for bad timeRemaining");
            duration
        }
    };

    let current_session = match obj.get("currentSession").and_then(Value::as_u64) {
        Some(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => 1,
    };

    Some(TimerState {
        phase: RunPhase::from_flags(is_running, is_paused),
        time_remaining,
        current_session,
        current_session_type: session_type,
        last_updated,
    })
}

fn bool_field(obj: &serde_json::Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// In-process key-value backend. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self
            .inner
            .lock()
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        Ok(map.get(key).cloned())
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn local_noon() -> DateTime<Utc> {
        Local::now()
            .date_naive()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    struct BrokenKv;

    impl KvStore for BrokenKv {
        fn kv_get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Locked)
        }
        fn kv_set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Locked)
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::from_minutes(25, 5, 15, 4)
    }

    #[test]
    fn idle_round_trip_is_identity() {
        let kv = MemoryKv::new();
        let store = PersistenceStore::new(kv.clone());
        let now = local_noon();
        let state = TimerState {
            phase: RunPhase::Idle,
            time_remaining: 300,
            current_session: 3,
            current_session_type: SessionType::ShortBreak,
            last_updated: now,
        };
        store.write(&state);
        assert_eq!(store.recover(now + Duration::seconds(40), &config()), state);
    }

    #[test]
    fn paused_snapshot_is_not_elapsed() {
        let store = PersistenceStore::new(MemoryKv::new());
        let now = local_noon();
        let mut state = TimerState::initial(&config(), now);
        state.phase = RunPhase::Paused;
        state.time_remaining = 700;
        store.write(&state);
        assert_eq!(store.recover(now + Duration::seconds(60), &config()), state);
    }

    #[test]
    fn running_snapshot_subtracts_elapsed() {
        let store = PersistenceStore::new(MemoryKv::new());
        let written = local_noon();
        let mut state = TimerState::initial(&config(), written);
        state.phase = RunPhase::Running;
        state.time_remaining = 600;
        store.write(&state);

        let now = written + Duration::seconds(45);
        let recovered = store.recover(now, &config());
        assert!(recovered.is_counting());
        assert_eq!(recovered.time_remaining, 555);
        assert_eq!(recovered.last_updated, now);
    }

    #[test]
    fn elapsed_never_goes_negative() {
        let store = PersistenceStore::new(MemoryKv::new());
        let now = local_noon();
        let mut state = TimerState::initial(&config(), now - Duration::seconds(5));
        state.phase = RunPhase::Running;
        state.time_remaining = 3;
        store.write(&state);
        let recovered = store.recover(now, &config());
        assert_eq!(recovered.time_remaining, 0);
    }

    #[test]
    fn yesterday_running_snapshot_yields_defaults() {
        let store = PersistenceStore::new(MemoryKv::new());
        let now = local_noon();
        let yesterday = now - Duration::days(1);
        let state = TimerState {
            phase: RunPhase::Running,
            time_remaining: 800,
            current_session: 3,
            current_session_type: SessionType::Focus,
            last_updated: yesterday,
        };
        store.write(&state);
        assert_eq!(store.recover(now, &config()), TimerState::initial(&config(), now));
    }

    #[test]
    fn malformed_fields_fall_back_per_field() {
        let kv = MemoryKv::new();
        let store = PersistenceStore::new(kv.clone());
        let now = local_noon();
        let raw = serde_json::json!({
            "isRunning": "yes",
            "isPaused": false,
            "timeRemaining": null,
            "currentSession": -2,
            "currentSessionType": "longBreak",
            "lastUpdated": now.to_rfc3339(),
        });
        kv.kv_set(SNAPSHOT_KEY, &raw.to_string()).unwrap();

        let snap = store.read(&config()).unwrap();
        assert_eq!(snap.state.phase, RunPhase::Idle);
        assert_eq!(snap.state.time_remaining, 900);
        assert_eq!(snap.state.current_session, 1);
        assert_eq!(snap.state.current_session_type, SessionType::LongBreak);
    }

    #[test]
    fn unknown_session_type_and_missing_fields() {
        let kv = MemoryKv::new();
        let store = PersistenceStore::new(kv.clone());
        let now = local_noon();
        let raw = format!(r#"{{"currentSessionType":"nap","lastUpdated":"{}"}}"#, now.to_rfc3339());
        kv.kv_set(SNAPSHOT_KEY, &raw).unwrap();
        let snap = store.read(&config()).unwrap();
        assert_eq!(snap.state.current_session_type, SessionType::Focus);
        assert_eq!(snap.state.time_remaining, 1500);
    }

    #[test]
    fn undecodable_snapshot_recovers_defaults() {
        let kv = MemoryKv::new();
        let store = PersistenceStore::new(kv.clone());
        let now = local_noon();

        kv.kv_set(SNAPSHOT_KEY, "{not json").unwrap();
        assert!(store.read(&config()).is_none());
        assert_eq!(store.recover(now, &config()), TimerState::initial(&config(), now));

        kv.kv_set(SNAPSHOT_KEY, r#"{"isRunning":true}"#).unwrap();
        assert!(store.read(&config()).is_none());
    }

    #[test]
    fn restore_reseeds_idle_snapshot_after_duration_change() {
        let store = PersistenceStore::new(MemoryKv::new());
        let now = local_noon();
        store.write(&TimerState::initial(&config(), now));
        store.write_config(&config());

        let longer = SessionConfig::from_minutes(50, 5, 15, 4);
        let machine = store.restore(now + Duration::seconds(30), &longer);
        assert_eq!(machine.state().time_remaining, 3000);
        assert_eq!(machine.state().phase, RunPhase::Idle);
        assert_eq!(machine.config(), &longer);
    }

    #[test]
    fn restore_reseeds_paused_but_keeps_running_countdown() {
        let store = PersistenceStore::new(MemoryKv::new());
        let now = local_noon();
        let mut state = TimerState::initial(&config(), now);
        state.phase = RunPhase::Paused;
        state.time_remaining = 700;
        store.write(&state);
        store.write_config(&config());
        let longer = SessionConfig::from_minutes(50, 5, 15, 4);
        assert_eq!(store.restore(now, &longer).state().time_remaining, 3000);

        state.phase = RunPhase::Running;
        store.write(&state);
        let machine = store.restore(now + Duration::seconds(100), &longer);
        assert_eq!(machine.state().phase, RunPhase::Running);
        assert_eq!(machine.state().time_remaining, 600);
        assert!(machine.awaiting_arm());
    }

    #[test]
    fn restore_with_unchanged_config_keeps_snapshot() {
        let store = PersistenceStore::new(MemoryKv::new());
        let now = local_noon();
        let mut state = TimerState::initial(&config(), now);
        state.phase = RunPhase::Paused;
        state.time_remaining = 700;
        store.write(&state);
        store.write_config(&config());
        assert_eq!(store.restore(now, &config()).state(), &state);

        // Without a recorded config the snapshot is read as-is.
        let bare = PersistenceStore::new(MemoryKv::new());
        bare.write(&state);
        let longer = SessionConfig::from_minutes(50, 5, 15, 4);
        assert_eq!(bare.restore(now, &longer).state().time_remaining, 700);
    }

    #[test]
    fn unreadable_config_record_is_ignored() {
        let kv = MemoryKv::new();
        let store = PersistenceStore::new(kv.clone());
        kv.kv_set("pomodoroState.config", "[1, 2").unwrap();
        assert!(store.read_config().is_none());
        store.write_config(&config());
        assert_eq!(store.read_config(), Some(config()));
    }

    #[test]
    fn broken_backend_never_fails_outward() {
        let store = PersistenceStore::new(BrokenKv);
        let now = local_noon();
        store.write(&TimerState::initial(&config(), now));
        assert!(store.read(&config()).is_none());
        assert_eq!(store.recover(now, &config()), TimerState::initial(&config(), now));
    }
}
