// Core domain types shared across the autopilot crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of filesystem change observed by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

/// Working-tree status of a path, collapsed from the porcelain `XY` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Untracked,
    Conflicted,
}

impl FileStatus {
    /// Map a two-character porcelain status code (`" M"`, `"??"`, `"AD"`, ...).
    pub fn from_porcelain(code: &str) -> Self {
        let code = code.trim();
        if code == "??" {
            return Self::Untracked;
        }
        if code.contains('U') || code == "AA" || code == "DD" {
            return Self::Conflicted;
        }
        if code.contains('D') {
            return Self::Deleted;
        }
        if code.contains('R') {
            return Self::Renamed;
        }
        if code.contains('C') {
            return Self::Copied;
        }
        if code.contains('A') {
            return Self::Added;
        }
        if code.contains('T') {
            return Self::TypeChanged;
        }
        Self::Modified
    }

    /// True for paths that did not exist in HEAD.
    pub fn is_new(self) -> bool {
        matches!(self, Self::Added | Self::Untracked | Self::Copied)
    }

    pub fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// A single changed path in the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub status: FileStatus,
    pub path: String,
}

impl ChangedFile {
    pub fn new(status: FileStatus, path: impl Into<String>) -> Self {
        Self { status, path: path.into() }
    }
}

// ── Persisted runtime state ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Paused,
}

/// Persisted pause flag for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseState {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
}

impl PauseState {
    pub fn running() -> Self {
        Self::default()
    }

    pub fn paused(reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { status: RunStatus::Paused, reason: Some(reason.into()), paused_at: Some(at) }
    }

    pub fn is_paused(&self) -> bool {
        self.status == RunStatus::Paused
    }
}

/// A commit authored by the daemon, recorded for targeted undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub hash: String,
    pub message: String,
    pub files: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Contents of the per-repository lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

// ── Status query ───────────────────────────────────────────────────

/// Lifecycle phase of the scheduler for one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    #[default]
    Stopped,
    Starting,
    Watching,
    Debouncing,
    Processing,
}

/// Read-only view of a repository's automation state for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub running: bool,
    pub pid: Option<u32>,
    pub paused: bool,
    pub pause_reason: Option<String>,
    pub phase: SchedulerPhase,
    pub last_commit: Option<LedgerEntry>,
    pub pending_files: usize,
    pub commits_today: usize,
}
