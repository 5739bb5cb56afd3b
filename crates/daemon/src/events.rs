// Append-only NDJSON event log at `<repo>/.autopilot/events.ndjson`.
//
// One object per line: `{"timestamp": ..., "type": ..., ...fields}`. Write
// failures are logged and never interrupt a commit cycle.
//
// When an append would push the file past `MAX_LOG_BYTES` it is renamed to
// `events.ndjson.1` (replacing any older generation) and a fresh file started.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::security::{create_private_dir, open_private_append};

const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    DaemonStarted,
    DaemonStopped,
    Commit,
    Push,
    PushFailed,
    Paused,
    Resumed,
    SafetyBlocked,
    RemoteConflict,
    UnpushedLimit,
    Undo,
    FocusSwitch,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DaemonStarted => "daemon_started",
            Self::DaemonStopped => "daemon_stopped",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::PushFailed => "push_failed",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::SafetyBlocked => "safety_blocked",
            Self::RemoteConflict => "remote_conflict",
            Self::UnpushedLimit => "unpushed_limit",
            Self::Undo => "undo",
            Self::FocusSwitch => "focus_switch",
        }
    }
}

/// Receives activity notifications from the scheduler.
pub trait FocusObserver: Send + Sync {
    fn on_file_event(&self, path: &str);
    fn on_commit(&self, hash: &str, files: &[String]);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFocusObserver;

impl FocusObserver for NoopFocusObserver {
    fn on_file_event(&self, _path: &str) {}
    fn on_commit(&self, _hash: &str, _files: &[String]) {}
}

#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    max_bytes: u64,
    write_lock: Mutex<()>,
    active_file: Mutex<Option<String>>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: MAX_LOG_BYTES,
            write_lock: Mutex::new(()),
            active_file: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Path of the previous generation.
    fn rotated_path(&self) -> PathBuf {
        let mut rotated = self.path.clone().into_os_string();
        rotated.push(".1");
        PathBuf::from(rotated)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. `fields` must be a JSON object or null.
    pub fn record(&self, kind: EventKind, fields: Value) {
        if let Err(error) = self.try_record(kind, fields) {
            warn!(path = %self.path.display(), error = %error, event = kind.as_str(), "failed to write event log");
        }
    }

    fn try_record(&self, kind: EventKind, fields: Value) -> std::io::Result<()> {
        let mut entry = Map::new();
        entry.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        entry.insert("type".to_string(), json!(kind.as_str()));
        if let Value::Object(fields) = fields {
            for (key, value) in fields {
                if key != "timestamp" && key != "type" {
                    entry.insert(key, value);
                }
            }
        }

        let mut line = serde_json::to_vec(&Value::Object(entry)).map_err(std::io::Error::other)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir)?;
        }
        self.rotate_if_full(line.len() as u64)?;
        let mut file = open_private_append(&self.path)?;
        file.write_all(&line)
    }

    fn rotate_if_full(&self, incoming: u64) -> std::io::Result<()> {
        let size = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error),
        };
        if size == 0 || size + incoming <= self.max_bytes {
            return Ok(());
        }
        let rotated = self.rotated_path();
        std::fs::rename(&self.path, &rotated)?;
        debug!(path = %rotated.display(), bytes = size, "rotated event log");
        Ok(())
    }
}

impl FocusObserver for EventLog {
    fn on_file_event(&self, path: &str) {
        let previous = {
            let mut active = self.active_file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if active.as_deref() == Some(path) {
                return;
            }
            active.replace(path.to_string())
        };
        if let Some(from) = previous {
            self.record(EventKind::FocusSwitch, json!({ "from": from, "to": path }));
        }
    }

    /// A commit ends the current focus session.
    fn on_commit(&self, _hash: &str, _files: &[String]) {
        let mut active = self.active_file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *active = None;
    }
}

/// Read every well-formed event from a log file. Malformed lines are skipped.
pub fn read_events(path: &Path) -> Vec<Value> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    contents.lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn records_are_one_json_object_per_line() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join(".autopilot").join("events.ndjson"));

        log.record(EventKind::Commit, json!({ "hash": "abc", "files": ["a.txt"] }));
        log.record(EventKind::Paused, json!({ "reason": "push rejected" }));

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let events = read_events(log.path());
        assert_eq!(events[0]["type"], "commit");
        assert_eq!(events[0]["hash"], "abc");
        assert!(events[0]["timestamp"].is_string());
        assert_eq!(events[1]["reason"], "push rejected");
    }

    #[test]
    fn full_log_rotates_to_one_previous_generation() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("events.ndjson")).with_max_bytes(200);

        for n in 0..12 {
            log.record(EventKind::Commit, json!({ "hash": format!("{n:040}") }));
        }

        let current = std::fs::metadata(log.path()).unwrap().len();
        assert!(current <= 200, "current log is {current} bytes");
        assert!(log.rotated_path().ends_with("events.ndjson.1"));
        let previous = read_events(&log.rotated_path());
        assert!(!previous.is_empty());

        // Nothing older than the two generations survives; the newest is current.
        let newest = read_events(log.path());
        assert_eq!(newest.last().unwrap()["hash"], format!("{:040}", 11));
        assert!(previous.len() + newest.len() < 12);
        assert!(!tmp.path().join("events.ndjson.2").exists());
    }

    #[test]
    fn focus_switches_cannot_grow_the_log_without_bound() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("events.ndjson")).with_max_bytes(1024);

        for n in 0..500 {
            log.on_file_event(&format!("src/file_{}.rs", n % 2));
        }

        assert!(std::fs::metadata(log.path()).unwrap().len() <= 1024);
        assert!(std::fs::metadata(log.rotated_path()).unwrap().len() <= 1024);
    }

    #[test]
    fn fields_cannot_override_type_or_timestamp() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("events.ndjson"));

        log.record(EventKind::Undo, json!({ "type": "forged", "timestamp": 0 }));

        let events = read_events(log.path());
        assert_eq!(events[0]["type"], "undo");
        assert!(events[0]["timestamp"].is_string());
    }

    #[test]
    fn focus_switch_is_logged_only_when_active_file_changes() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("events.ndjson"));

        log.on_file_event("a.rs");
        log.on_file_event("a.rs");
        log.on_file_event("b.rs");

        let events = read_events(log.path());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "focus_switch");
        assert_eq!(events[0]["from"], "a.rs");
        assert_eq!(events[0]["to"], "b.rs");
    }

    #[test]
    fn commit_resets_focus_without_switch_event() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("events.ndjson"));

        log.on_file_event("a.rs");
        log.on_commit("abc", &["a.rs".to_string()]);
        log.on_file_event("b.rs");

        assert!(read_events(log.path()).is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped_on_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("events.ndjson");
        std::fs::write(&path, "{\"type\":\"commit\"}\nnot json\n").unwrap();

        assert_eq!(read_events(&path).len(), 1);
    }
}
