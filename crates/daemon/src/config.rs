// Layered configuration for the daemon.
//
// Global config: `$AUTOPILOT_CONFIG_DIR/config.json` (default `~/.autopilot/`)
// Local config:  `<repo>/.autopilotrc.json`
//
// Files are deep-merged as JSON objects (defaults < global < local) and the
// result is deserialized into `EffectiveConfig`. A file that exists but does
// not parse or type-check is an error; nothing falls back to a partial read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::security::write_private_atomic;

pub const LOCAL_CONFIG_FILE: &str = ".autopilotrc.json";
pub const GLOBAL_CONFIG_FILE: &str = "config.json";
pub const CONFIG_DIR_ENV: &str = "AUTOPILOT_CONFIG_DIR";

const DEFAULT_LINT_COMMAND: &str = "npm run lint";
const DEFAULT_TEST_COMMAND: &str = "npm test";

/// Root directory for per-user state: `$AUTOPILOT_CONFIG_DIR` or `~/.autopilot/`.
pub fn global_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs::home_dir().map(|home| home.join(".autopilot"))
}

/// Path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Path to the repository-local config file.
pub fn local_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(LOCAL_CONFIG_FILE)
}

// ── Effective config ───────────────────────────────────────────────

/// Immutable snapshot of the merged configuration for one repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectiveConfig {
    /// Quiet period after the last change before a cycle runs.
    pub debounce_seconds: u64,
    /// Upper bound on how long continuous editing can defer a cycle.
    pub max_wait_seconds: u64,
    pub min_seconds_between_commits: u64,
    pub auto_push: bool,
    #[serde(alias = "blockedBranches")]
    pub block_branches: Vec<String>,
    pub remote: String,
    pub commit_message_mode: MessageMode,
    pub team_mode: bool,
    pub pull_before_push: bool,
    pub conflict_strategy: ConflictStrategy,
    /// Warn-only threshold for commits not yet on the remote (team mode).
    pub max_unpushed_commits: u32,
    pub require_checks: bool,
    pub checks: Vec<String>,
    pub pre_commit_checks: PreCommitChecks,
    pub max_file_size_bytes: u64,
    /// Extra ignore patterns, merged with `.autopilotignore`.
    pub ignore: Vec<String>,
    pub trust_trailers: bool,
    pub timeouts: TimeoutConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: 20,
            max_wait_seconds: 120,
            min_seconds_between_commits: 180,
            auto_push: true,
            block_branches: vec!["main".into(), "master".into()],
            remote: "origin".into(),
            commit_message_mode: MessageMode::Smart,
            team_mode: false,
            pull_before_push: false,
            conflict_strategy: ConflictStrategy::Abort,
            max_unpushed_commits: 5,
            require_checks: false,
            checks: Vec::new(),
            pre_commit_checks: PreCommitChecks::default(),
            max_file_size_bytes: 50 * 1024 * 1024,
            ignore: Vec::new(),
            trust_trailers: true,
            timeouts: TimeoutConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl EffectiveConfig {
    /// Deserialize and validate a merged JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value).map_err(ConfigError::Type)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_seconds == 0 {
            return Err(ConfigError::Invalid("debounceSeconds must be at least 1".into()));
        }
        if self.max_wait_seconds < self.debounce_seconds {
            return Err(ConfigError::Invalid(format!(
                "maxWaitSeconds ({}) must not be shorter than debounceSeconds ({})",
                self.max_wait_seconds, self.debounce_seconds
            )));
        }
        if self.remote.trim().is_empty() {
            return Err(ConfigError::Invalid("remote must not be empty".into()));
        }
        if self.timeouts.git_seconds == 0
            || self.timeouts.network_seconds == 0
            || self.timeouts.check_seconds == 0
        {
            return Err(ConfigError::Invalid("timeouts must be at least 1 second".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_seconds)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_seconds_between_commits)
    }

    pub fn is_blocked_branch(&self, branch: &str) -> bool {
        self.block_branches.iter().any(|blocked| blocked == branch)
    }

    /// External gate commands in execution order.
    pub fn check_commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        let gates = &self.pre_commit_checks;
        commands.extend(gates.lint.command(DEFAULT_LINT_COMMAND));
        commands.extend(gates.test.command(DEFAULT_TEST_COMMAND));
        if self.require_checks {
            for check in self.checks.iter().filter(|c| !c.trim().is_empty()) {
                if !commands.contains(check) {
                    commands.push(check.clone());
                }
            }
        }
        commands
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageMode {
    #[default]
    Smart,
    Simple,
}

/// What a failed rebase-pull in team mode does to the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Skip this cycle only.
    #[default]
    Abort,
    /// Skip and persist the paused state.
    Pause,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PreCommitChecks {
    pub file_size: bool,
    pub secrets: bool,
    pub lint: CheckSetting,
    pub test: CheckSetting,
}

impl Default for PreCommitChecks {
    fn default() -> Self {
        Self {
            file_size: true,
            secrets: true,
            lint: CheckSetting::default(),
            test: CheckSetting::default(),
        }
    }
}

/// `true` runs the gate's default script; a string names the command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CheckSetting {
    Enabled(bool),
    Command(String),
}

impl Default for CheckSetting {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl CheckSetting {
    pub fn command(&self, default: &str) -> Option<String> {
        match self {
            Self::Enabled(true) => Some(default.to_string()),
            Self::Enabled(false) => None,
            Self::Command(command) if command.trim().is_empty() => None,
            Self::Command(command) => Some(command.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    pub git_seconds: u64,
    pub network_seconds: u64,
    pub check_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { git_seconds: 30, network_seconds: 60, check_seconds: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

// ── Store ──────────────────────────────────────────────────────────

/// Which file a `config set` writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Local,
    Global,
}

/// Reads and edits the config files for one repository.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    local_path: PathBuf,
    global_path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(repo_root: &Path) -> Self {
        Self::with_global_path(repo_root, global_config_path())
    }

    pub fn with_global_path(repo_root: &Path, global_path: Option<PathBuf>) -> Self {
        Self { local_path: local_config_path(repo_root), global_path }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn global_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Load the merged, validated configuration.
    pub fn load(&self) -> Result<EffectiveConfig, ConfigError> {
        EffectiveConfig::from_value(self.merged_value()?)
    }

    /// defaults < global < local, as raw JSON.
    pub fn merged_value(&self) -> Result<Value, ConfigError> {
        let mut merged =
            serde_json::to_value(EffectiveConfig::default()).map_err(ConfigError::Serialize)?;
        if let Some(global) = self.global_path.as_deref() {
            if let Some(value) = read_config_file(global)? {
                merge_layer(&mut merged, value);
            }
        }
        if let Some(local) = read_config_file(&self.local_path)? {
            merge_layer(&mut merged, local);
        }
        Ok(merged)
    }

    /// Raw contents of one file (`{}` when it does not exist).
    pub fn raw(&self, scope: ConfigScope) -> Result<Value, ConfigError> {
        let path = self.path_for(scope)?;
        Ok(read_config_file(path)?.unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Look up a dotted key in the merged config.
    pub fn get(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let merged = self.merged_value()?;
        Ok(get_dotted(&merged, key).cloned())
    }

    /// Set a dotted key in one file. The raw file is edited in place (merged
    /// defaults are never written back) and the result must still validate.
    pub fn set(&self, scope: ConfigScope, key: &str, raw_value: &str) -> Result<Value, ConfigError> {
        let value = parse_value(raw_value);
        let mut file = self.raw(scope)?;
        set_dotted(&mut file, key, value.clone())?;
        self.validate_with(scope, &file)?;
        write_config_file(self.path_for(scope)?, &file)?;
        debug!(key, scope = ?scope, "config value updated");
        Ok(value)
    }

    /// Merge `settings` into one file (used by presets).
    pub fn merge_into(&self, scope: ConfigScope, settings: Value) -> Result<(), ConfigError> {
        let mut file = self.raw(scope)?;
        deep_merge(&mut file, settings);
        self.validate_with(scope, &file)?;
        write_config_file(self.path_for(scope)?, &file)
    }

    /// Write the defaults to the local file if it does not exist yet.
    pub fn write_local_defaults(&self) -> Result<bool, ConfigError> {
        if self.local_path.exists() {
            return Ok(false);
        }
        let defaults =
            serde_json::to_value(EffectiveConfig::default()).map_err(ConfigError::Serialize)?;
        write_config_file(&self.local_path, &defaults)?;
        Ok(true)
    }

    fn validate_with(&self, scope: ConfigScope, candidate: &Value) -> Result<(), ConfigError> {
        let mut merged =
            serde_json::to_value(EffectiveConfig::default()).map_err(ConfigError::Serialize)?;
        let global = match scope {
            ConfigScope::Global => Some(candidate.clone()),
            ConfigScope::Local => match self.global_path.as_deref() {
                Some(path) => read_config_file(path)?,
                None => None,
            },
        };
        if let Some(global) = global {
            merge_layer(&mut merged, global);
        }
        let local = match scope {
            ConfigScope::Local => Some(candidate.clone()),
            ConfigScope::Global => read_config_file(&self.local_path)?,
        };
        if let Some(local) = local {
            merge_layer(&mut merged, local);
        }
        EffectiveConfig::from_value(merged).map(|_| ())
    }

    fn path_for(&self, scope: ConfigScope) -> Result<&Path, ConfigError> {
        match scope {
            ConfigScope::Local => Ok(&self.local_path),
            ConfigScope::Global => self.global_path.as_deref().ok_or(ConfigError::NoConfigDir),
        }
    }
}

// ── Presets ────────────────────────────────────────────────────────

/// A named bundle of settings merged into the local config.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    settings: fn() -> Value,
}

impl Preset {
    pub fn settings(&self) -> Value {
        (self.settings)()
    }
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "safe-team",
        description: "Safe configuration for team collaboration",
        settings: || {
            serde_json::json!({
                "teamMode": true,
                "pullBeforePush": true,
                "conflictStrategy": "abort",
                "commitMessageMode": "smart",
                "debounceSeconds": 30,
                "minSecondsBetweenCommits": 300,
                "preCommitChecks": { "secrets": true },
            })
        },
    },
    Preset {
        name: "solo-speed",
        description: "Fast-paced configuration for solo developers",
        settings: || {
            serde_json::json!({
                "teamMode": false,
                "pullBeforePush": false,
                "commitMessageMode": "simple",
                "debounceSeconds": 5,
                "minSecondsBetweenCommits": 60,
                "autoPush": true,
            })
        },
    },
    Preset {
        name: "strict-ci",
        description: "Strict configuration ensuring quality checks pass",
        settings: || {
            serde_json::json!({
                "requireChecks": true,
                "checks": ["npm test", "npm run lint"],
                "preCommitChecks": {
                    "secrets": true,
                    "fileSize": true,
                    "lint": true,
                    "test": true,
                },
            })
        },
    },
];

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.name == name)
}

// ── JSON helpers ───────────────────────────────────────────────────

fn read_config_file(path: &Path) -> Result<Option<Value>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ConfigError::Io { path: path.to_path_buf(), source }),
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(&contents)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    if !value.is_object() {
        return Err(ConfigError::Invalid(format!(
            "`{}` must contain a JSON object",
            path.display()
        )));
    }
    Ok(Some(value))
}

fn write_config_file(path: &Path, value: &Value) -> Result<(), ConfigError> {
    let mut contents = serde_json::to_string_pretty(value).map_err(ConfigError::Serialize)?;
    contents.push('\n');
    write_private_atomic(path, contents.as_bytes())
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}

/// Recursively merge `overlay` into `base`; non-object values replace.
/// Legacy key spellings, renamed per layer before merging so they override
/// the canonical key from lower layers.
const KEY_ALIASES: &[(&str, &str)] = &[("blockedBranches", "blockBranches")];

fn merge_layer(base: &mut Value, mut layer: Value) {
    if let Value::Object(map) = &mut layer {
        for (alias, canonical) in KEY_ALIASES {
            if let Some(value) = map.remove(*alias) {
                map.entry(canonical.to_string()).or_insert(value);
            }
        }
    }
    deep_merge(base, layer);
}

pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

pub fn get_dotted<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(value, |current, part| current.get(part))
}

pub fn set_dotted(value: &mut Value, key: &str, new_value: Value) -> Result<(), ConfigError> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(ConfigError::InvalidKey(key.to_string()));
    }

    let (last, parents) = parts.split_last().ok_or_else(|| ConfigError::InvalidKey(key.into()))?;
    let mut current = value;
    for part in parents {
        let object = current.as_object_mut().ok_or_else(|| ConfigError::InvalidKey(key.into()))?;
        current = object.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    let object = current.as_object_mut().ok_or_else(|| ConfigError::InvalidKey(key.into()))?;
    object.insert(last.to_string(), new_value);
    Ok(())
}

/// Interpret a CLI value: booleans, numbers, `null` and JSON arrays/objects
/// are parsed; anything else is kept as a string.
pub fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if trimmed.parse::<f64>().is_ok() || trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error in `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value: {0}")]
    Type(#[source] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid config key `{0}`")]
    InvalidKey(String),
    #[error("config serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("could not determine the global config directory")]
    NoConfigDir,
}
