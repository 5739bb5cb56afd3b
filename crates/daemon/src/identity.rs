// Anonymous installation identity, created lazily and persisted in the
// global config directory as `identity.json` (`{id, created}`).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::security::{create_private_dir, write_private_atomic};

pub const IDENTITY_FILE: &str = "identity.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created: i64,
}

impl Identity {
    fn generate() -> Self {
        Self { id: Uuid::new_v4().to_string(), created: Utc::now().timestamp_millis() }
    }
}

/// Process-wide identity store. Construct once and share by reference.
#[derive(Debug)]
pub struct IdentityStore {
    path: Option<PathBuf>,
    cached: Mutex<Option<Identity>>,
}

impl IdentityStore {
    /// Store rooted at `dir` (normally the global config directory).
    pub fn new(dir: &Path) -> Self {
        Self { path: Some(dir.join(IDENTITY_FILE)), cached: Mutex::new(None) }
    }

    /// Store that never touches disk; a fresh identity lives for the process.
    pub fn in_memory() -> Self {
        Self { path: None, cached: Mutex::new(None) }
    }

    /// Store with a fixed identity, for callers that need deterministic ids.
    pub fn fixed(identity: Identity) -> Self {
        Self { path: None, cached: Mutex::new(Some(identity)) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Return the identity, creating and persisting it on first use.
    ///
    /// Filesystem failures fall back to an identity that lives only for this
    /// process; signing must never block a commit.
    pub fn get(&self) -> Identity {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(identity) = cached.as_ref() {
            return identity.clone();
        }

        let identity = match &self.path {
            Some(path) => load_or_create(path),
            None => Identity::generate(),
        };
        *cached = Some(identity.clone());
        identity
    }
}

fn load_or_create(path: &Path) -> Identity {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Identity>(&contents) {
            Ok(identity) => return identity,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "corrupt identity file, regenerating");
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to read identity file");
            return Identity::generate();
        }
    }

    let identity = Identity::generate();
    if let Err(error) = persist(path, &identity) {
        warn!(path = %path.display(), error = %error, "failed to persist identity, using in-memory id");
    } else {
        debug!(id = %identity.id, "created anonymous identity");
    }
    identity
}

fn persist(path: &Path, identity: &Identity) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        create_private_dir(dir)?;
    }
    let contents = serde_json::to_vec_pretty(identity).map_err(std::io::Error::other)?;
    write_private_atomic(path, &contents)
}
