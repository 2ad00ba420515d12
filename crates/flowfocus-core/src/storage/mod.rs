mod config;
pub mod database;
pub mod snapshot;

pub use config::{Config, NotificationsConfig, ScheduleConfig};
pub use database::{Database, SessionRow};
pub use snapshot::{MemoryKv, PersistedSnapshot, PersistenceStore, SNAPSHOT_KEY};

use std::path::PathBuf;

use crate::error::StorageError;
use crate::events::CompletedSession;

/// Durable string key-value storage backing the timer snapshot.
pub trait KvStore: Send {
    fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Record-completed-session collaborator, invoked once per completion.
pub trait SessionSink: Send + Sync {
    fn record(&self, session: &CompletedSession) -> Result<(), StorageError>;
}

/// Returns the data directory.
///
/// `FLOWFOCUS_HOME` overrides the location outright. Otherwise this is
/// `~/.config/flowfocus[-dev]/`, with `FLOWFOCUS_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let dir = match std::env::var_os("FLOWFOCUS_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FLOWFOCUS_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("flowfocus-dev")
            } else {
                base_dir.join("flowfocus")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| StorageError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
