// Single-instance lock for one repository.
//
// Exclusivity comes from an OS advisory lock (`flock`/`LockFileEx` via fs2)
// held on the open file for the daemon's lifetime. The JSON body
// (`{pid, startedAt}`) is informational only: a file left behind by a crashed
// process is not locked and is simply taken over.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use autopilot_common::types::LockInfo;
use chrono::Utc;
use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::error::AutopilotError;
use crate::security::ensure_owner_only_file;

const ACQUIRE_ATTEMPTS: usize = 3;

/// Result of checking a lock file without taking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockProbe {
    /// No lock file.
    Free,
    /// A live process holds the lock.
    Held(Option<LockInfo>),
    /// A lock file exists but nobody holds it.
    Stale(Option<LockInfo>),
}

#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl RepoLock {
    /// Take the lock or fail with `LockConflict` naming the current holder.
    pub fn acquire(path: &Path) -> Result<Self, AutopilotError> {
        if let Some(parent) = path.parent() {
            crate::security::create_private_dir(parent)
                .map_err(|source| AutopilotError::io(parent, source))?;
        }

        for _ in 0..ACQUIRE_ATTEMPTS {
            let mut file = open_lock_file(path)?;
            if let Err(error) = file.try_lock_exclusive() {
                if error.kind() == fs2::lock_contended_error().kind() {
                    let holder = read_lock_info(path);
                    return Err(AutopilotError::LockConflict {
                        pid: holder.map(|info| info.pid).unwrap_or_default(),
                        path: path.to_path_buf(),
                    });
                }
                return Err(AutopilotError::io(path, error));
            }

            // The previous holder may have unlinked the file between our open
            // and our lock; a lock on an orphaned inode excludes nobody.
            if !refers_to_same_file(&file, path) {
                debug!(path = %path.display(), "lock file replaced during acquire, retrying");
                continue;
            }

            let info = LockInfo { pid: std::process::id(), started_at: Utc::now() };
            write_lock_info(&mut file, &info).map_err(|source| AutopilotError::io(path, source))?;
            ensure_owner_only_file(path).map_err(|source| AutopilotError::io(path, source))?;
            info!(pid = info.pid, path = %path.display(), "acquired repository lock");

            return Ok(Self { file, path: path.to_path_buf(), info, released: false });
        }

        Err(AutopilotError::RepositoryState(format!(
            "lock file `{}` kept changing while acquiring it",
            path.display()
        )))
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file and drop the OS lock.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Unlink before unlocking so a waiter never locks a file we then delete.
        if let Err(error) = fs::remove_file(&self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %error, path = %self.path.display(), "failed to remove lock file");
            }
        }
        if let Err(error) = FileExt::unlock(&self.file) {
            warn!(error = %error, "failed to release repository lock");
        }
        info!(path = %self.path.display(), "released repository lock");
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Check who, if anyone, holds the lock at `path`.
pub fn probe(path: &Path) -> Result<LockProbe, AutopilotError> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(LockProbe::Free),
        Err(source) => return Err(AutopilotError::io(path, source)),
    };

    let info = read_lock_info(path);
    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            Ok(LockProbe::Stale(info))
        }
        Err(error) if error.kind() == fs2::lock_contended_error().kind() => {
            Ok(LockProbe::Held(info))
        }
        Err(source) => Err(AutopilotError::io(path, source)),
    }
}

/// Remove a lock file nobody holds. Returns false if it is held or absent.
pub fn remove_stale(path: &Path) -> Result<bool, AutopilotError> {
    match probe(path)? {
        LockProbe::Stale(_) => {
            fs::remove_file(path).map_err(|source| AutopilotError::io(path, source))?;
            info!(path = %path.display(), "removed stale lock file");
            Ok(true)
        }
        LockProbe::Held(_) | LockProbe::Free => Ok(false),
    }
}

pub fn read_lock_info(path: &Path) -> Option<LockInfo> {
    let mut contents = String::new();
    File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}

fn open_lock_file(path: &Path) -> Result<File, AutopilotError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|source| AutopilotError::io(path, source))
}

fn write_lock_info(file: &mut File, info: &LockInfo) -> std::io::Result<()> {
    let contents = serde_json::to_vec(info).map_err(std::io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&contents)?;
    file.sync_all()
}

#[cfg(unix)]
fn refers_to_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(open), Ok(on_disk)) => open.ino() == on_disk.ino() && open.dev() == on_disk.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn refers_to_same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lock_path(tmp: &TempDir) -> PathBuf {
        tmp.path().join(".autopilot").join("daemon.lock")
    }

    #[test]
    fn acquire_writes_pid_and_start_time() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);

        let lock = RepoLock::acquire(&path).unwrap();

        let info = read_lock_info(&path).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(&info, lock.info());
    }

    #[test]
    fn second_acquire_conflicts_while_held() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);
        let _held = RepoLock::acquire(&path).unwrap();

        let error = RepoLock::acquire(&path).unwrap_err();
        match error {
            AutopilotError::LockConflict { pid, .. } => assert_eq!(pid, std::process::id()),
            other => panic!("expected lock conflict, got {other:?}"),
        }
    }

    #[test]
    fn release_removes_file_and_allows_reacquire() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);

        RepoLock::acquire(&path).unwrap().release();
        assert!(!path.exists());
        assert_eq!(probe(&path).unwrap(), LockProbe::Free);

        let _again = RepoLock::acquire(&path).unwrap();
    }

    #[test]
    fn drop_releases_lock() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);
        {
            let _lock = RepoLock::acquire(&path).unwrap();
            assert!(matches!(probe(&path).unwrap(), LockProbe::Held(Some(_))));
        }
        assert_eq!(probe(&path).unwrap(), LockProbe::Free);
    }

    #[test]
    fn leftover_file_from_dead_process_is_stale_and_taken_over() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"pid":999999,"startedAt":"2026-01-01T00:00:00Z"}"#).unwrap();

        assert!(matches!(probe(&path).unwrap(), LockProbe::Stale(Some(info)) if info.pid == 999_999));

        let lock = RepoLock::acquire(&path).unwrap();
        assert_eq!(lock.info().pid, std::process::id());
    }

    #[test]
    fn remove_stale_leaves_held_lock_alone() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path(&tmp);
        let _held = RepoLock::acquire(&path).unwrap();

        assert!(!remove_stale(&path).unwrap());
        assert!(path.exists());
    }
}
