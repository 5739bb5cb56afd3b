// Consistent exit codes for the autopilot CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   3  = configuration error
//   10 = another daemon already holds the repository lock
//   11 = repository state (not a repository, blocked branch, merge in progress)
//   12 = daemon not running

use std::process;

use autopilot_daemon::config::ConfigError;
use autopilot_daemon::AutopilotError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Config = 3,
    AlreadyRunning = 10,
    RepositoryState = 11,
    NotRunning = 12,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(error) = cause.downcast_ref::<AutopilotError>() {
                return Self::from_autopilot_error(error);
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Config;
            }
            if cause.downcast_ref::<NotRunning>().is_some() {
                return Self::NotRunning;
            }
            if cause.downcast_ref::<UsageError>().is_some() {
                return Self::Usage;
            }
        }
        Self::Error
    }

    pub fn from_autopilot_error(error: &AutopilotError) -> Self {
        match error {
            AutopilotError::Config(_) => Self::Config,
            AutopilotError::LockConflict { .. } => Self::AlreadyRunning,
            AutopilotError::RepositoryState(_) => Self::RepositoryState,
            _ => Self::Error,
        }
    }

    /// Exit the process with this code.
    pub fn exit(self) -> ! {
        process::exit(self.code())
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// No daemon holds the repository lock.
#[derive(Debug)]
pub struct NotRunning;

impl std::fmt::Display for NotRunning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "autopilot is not running in this repository")
    }
}

impl std::error::Error for NotRunning {}

/// Bad argument value that clap cannot catch (unknown preset, zero count).
#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::Config.code(), 3);
        assert_eq!(ExitCode::AlreadyRunning.code(), 10);
        assert_eq!(ExitCode::RepositoryState.code(), 11);
        assert_eq!(ExitCode::NotRunning.code(), 12);
    }

    #[test]
    fn lock_conflict_is_already_running() {
        let err = anyhow::Error::new(AutopilotError::LockConflict { pid: 42, path: "/r/.autopilot/daemon.lock".into() });
        assert_eq!(ExitCode::from_error(&err), ExitCode::AlreadyRunning);
    }

    #[test]
    fn repository_state_survives_context() {
        let err = Err::<(), _>(AutopilotError::RepositoryState("not a git repository".into()))
            .context("failed to start")
            .unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::RepositoryState);
    }

    #[test]
    fn config_errors_map_to_config_code() {
        let bare = anyhow::Error::new(ConfigError::Invalid("debounceSeconds must be at least 1".into()));
        assert_eq!(ExitCode::from_error(&bare), ExitCode::Config);

        let wrapped = anyhow::Error::new(AutopilotError::Config(ConfigError::NoConfigDir));
        assert_eq!(ExitCode::from_error(&wrapped), ExitCode::Config);
    }

    #[test]
    fn typed_cli_errors() {
        assert_eq!(ExitCode::from_error(&anyhow::Error::new(NotRunning)), ExitCode::NotRunning);
        assert_eq!(ExitCode::from_error(&anyhow::Error::new(UsageError("bad".into()))), ExitCode::Usage);
    }

    #[test]
    fn from_error_generic_is_error() {
        let err = anyhow::anyhow!("something went wrong");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Error);
    }
}
