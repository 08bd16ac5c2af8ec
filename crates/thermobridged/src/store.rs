//! Durable mirror of the last known thermostat state.
//!
//! One JSON file per accessory under the configured data directory. The
//! engine loads it once at startup and writes it after every accepted state
//! change. Writes go through a temp file and rename so a crash mid-write
//! never leaves a torn state on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::engine::state::{
    HeatingMode, DEFAULT_CURRENT_TEMPERATURE, DEFAULT_TARGET_TEMPERATURE,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid state file: {0}")]
    Json(#[from] serde_json::Error),
}

/// The durable subset of the thermostat state, written as a group.
///
/// Field names match the hub's historical key names so existing state files
/// stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub current_temperature: f64,
    pub target_temperature: f64,
    #[serde(rename = "targetHeatingCoolingState")]
    pub target_mode: HeatingMode,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            current_temperature: DEFAULT_CURRENT_TEMPERATURE,
            target_temperature: DEFAULT_TARGET_TEMPERATURE,
            target_mode: HeatingMode::Off,
        }
    }
}

/// File-backed store for one accessory's [`PersistedState`].
///
/// `load`/`save` do no locking; all mutations funnel through the engine's
/// operation handlers, which is the concurrency contract here.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    /// Set once `load` has succeeded. Until then `save` is a no-op, so a
    /// half-started process can never clobber durable state with defaults.
    initialized: AtomicBool,
}

impl StateStore {
    pub fn new(data_dir: impl AsRef<Path>, accessory_id: &str) -> Self {
        Self {
            path: data_dir.as_ref().join(format!("{accessory_id}.json")),
            initialized: AtomicBool::new(false),
        }
    }

    /// Load the persisted state, or defaults if nothing was persisted yet.
    ///
    /// A missing file is not an error. An unreadable or corrupt file is, and
    /// leaves the store uninitialized: later saves stay no-ops rather than
    /// overwrite durable state that was never read.
    pub async fn load(&self) -> Result<PersistedState, StoreError> {
        let state = match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no state file at {:?}, using defaults", self.path);
                PersistedState::default()
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        self.initialized.store(true, Ordering::Release);
        Ok(state)
    }

    /// Durably write all persisted fields together.
    ///
    /// Silently does nothing until `load` has completed.
    pub async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if !self.initialized.load(Ordering::Acquire) {
            debug!("store not initialized yet, skipping save");
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!("saved state to {:?}", self.path);
        Ok(())
    }
}
