// Persisted pause flag.

use std::path::PathBuf;

use autopilot_common::types::PauseState;
use chrono::Utc;
use tracing::info;

use super::{load_json_or_default, store_json, StatePaths};
use crate::error::AutopilotError;

pub const DEFAULT_PAUSE_REASON: &str = "User paused";

/// Reads and writes `<repo>/.autopilot/state.json`. Every call goes to disk,
/// so a fresh store for the same repository sees the same state.
#[derive(Debug, Clone)]
pub struct PauseStore {
    dir: PathBuf,
    path: PathBuf,
}

impl PauseStore {
    pub fn new(paths: &StatePaths) -> Self {
        Self { dir: paths.dir.clone(), path: paths.pause.clone() }
    }

    pub fn load(&self) -> PauseState {
        load_json_or_default(&self.path, "pause state")
    }

    pub fn is_paused(&self) -> bool {
        self.load().is_paused()
    }

    pub fn pause(&self, reason: Option<&str>) -> Result<PauseState, AutopilotError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(DEFAULT_PAUSE_REASON);
        let state = PauseState::paused(reason, Utc::now());
        store_json(&self.dir, &self.path, &state)?;
        info!(reason, "automation paused");
        Ok(state)
    }

    pub fn resume(&self) -> Result<PauseState, AutopilotError> {
        let state = PauseState::running();
        store_json(&self.dir, &self.path, &state)?;
        info!("automation resumed");
        Ok(state)
    }
}
