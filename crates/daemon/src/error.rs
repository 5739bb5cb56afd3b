// Error taxonomy for the automation core.
//
// Cycle-level failures are logged and the cycle is skipped; start-up and
// control failures surface to the caller as one of these variants.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::git::worker::GitWorkerError;

#[derive(Debug, Error)]
pub enum AutopilotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("repository state: {0}")]
    RepositoryState(String),

    #[error("another autopilot instance (pid {pid}) holds the lock at `{}`", path.display())]
    LockConflict { pid: u32, path: PathBuf },

    #[error("safety check failed: {}", violations.join("; "))]
    SafetyViolation { violations: Vec<String> },

    #[error("network operation failed: {0}")]
    Network(GitWorkerError),

    #[error("subprocess failed: {0}")]
    Subprocess(GitWorkerError),

    #[error("persisted state at `{}` is unreadable: {message}", path.display())]
    CorruptState { path: PathBuf, message: String },

    #[error("I/O error at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AutopilotError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

impl From<GitWorkerError> for AutopilotError {
    fn from(error: GitWorkerError) -> Self {
        if error.is_network() {
            Self::Network(error)
        } else {
            Self::Subprocess(error)
        }
    }
}

pub type Result<T, E = AutopilotError> = std::result::Result<T, E>;
