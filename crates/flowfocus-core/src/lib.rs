//! # FlowFocus Core Library
//!
//! This library provides the session timer engine behind FlowFocus: a
//! Pomodoro-style focus/break cycle that keeps correct time while its host
//! is throttled, survives restarts within the same day, and mirrors itself
//! onto a small companion display.
//!
//! ## Architecture
//!
//! - **Timer**: a synchronous, wall-clock based state machine
//!   ([`SessionStateMachine`]) and the async engine that drives it
//!   ([`TimerEngine`]) with a primary tick loop and a background ticker
//!   thread
//! - **Storage**: SQLite-backed snapshot and session history, TOML
//!   configuration
//! - **Overlay**: validated push protocol and rendering for the companion
//!   display
//! - **Notify**: completion notices and sound cues
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Async engine handle
//! - [`SessionStateMachine`]: Core timer state machine
//! - [`PersistenceStore`]: Snapshot persistence and recovery
//! - [`Database`]: Session history and key-value storage
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod notify;
pub mod overlay;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, NotifyError, OverlayError, StorageError, ValidationError};
pub use events::{CompletedSession, Event};
pub use notify::{CompletionNotice, Cue, LogNotifier, Notifier};
pub use storage::{Config, Database, MemoryKv, PersistenceStore};
pub use timer::{
    EngineDeps, RunPhase, SessionConfig, SessionStateMachine, SessionType, TimerEngine, TimerState,
};
