// Per-repository persisted runtime state under `<repo>/.autopilot/`.
//
// Unreadable files never abort start-up: readers log a warning and fall back
// to the safe default (running, empty ledger). Writers go through an atomic
// temp-file rename.

pub mod ledger;
pub mod lock;
pub mod pause;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::AutopilotError;
use crate::security::{create_private_dir, write_private_atomic};

pub use ledger::CommitLedger;
pub use lock::{probe as probe_lock, LockProbe, RepoLock};
pub use pause::PauseStore;

pub const STATE_DIR: &str = ".autopilot";

/// Resolved paths for one repository's runtime files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub dir: PathBuf,
    pub pause: PathBuf,
    pub ledger: PathBuf,
    pub lock: PathBuf,
    pub events: PathBuf,
}

impl StatePaths {
    pub fn for_repo(repo_root: &Path) -> Self {
        let dir = repo_root.join(STATE_DIR);
        Self {
            pause: dir.join("state.json"),
            ledger: dir.join("ledger.json"),
            lock: dir.join("daemon.lock"),
            events: dir.join("events.ndjson"),
            dir,
        }
    }

    pub fn ensure_dir(&self) -> Result<(), AutopilotError> {
        create_private_dir(&self.dir).map_err(|source| AutopilotError::io(&self.dir, source))
    }
}

/// Read a JSON file, treating a missing or unreadable file as the default.
pub(crate) fn load_json_or_default<T>(path: &Path, what: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to read {what}, using default");
            return T::default();
        }
    };

    match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "corrupt {what}, resetting to default");
            T::default()
        }
    }
}

pub(crate) fn store_json<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<(), AutopilotError> {
    create_private_dir(dir).map_err(|source| AutopilotError::io(dir, source))?;
    let mut contents = serde_json::to_vec_pretty(value).map_err(|error| AutopilotError::CorruptState {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    contents.push(b'\n');
    write_private_atomic(path, &contents).map_err(|source| AutopilotError::io(path, source))
}
