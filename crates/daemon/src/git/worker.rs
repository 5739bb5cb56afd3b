// Version-control client.
//
// Every git (and check) subprocess goes through a `CommandExecutor` with a
// bounded timeout. Failures come back as `GitWorkerError`; nothing here
// panics or lets an unexpected exit escape as anything but a value.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use autopilot_common::types::{ChangedFile, FileStatus};
use tracing::{debug, trace};

/// Git metadata entries that indicate an operation is mid-flight.
const IN_PROGRESS_MARKERS: &[(&str, &str)] = &[
    ("MERGE_HEAD", "merge"),
    ("REBASE_HEAD", "rebase"),
    ("rebase-merge", "rebase"),
    ("rebase-apply", "rebase"),
    ("CHERRY_PICK_HEAD", "cherry-pick"),
    ("REVERT_HEAD", "revert"),
    ("BISECT_LOG", "bisect"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitWorkerError {
    EmptyAddPaths,
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
    TimedOut { command: String, after: Duration },
    Parse { command: String, message: String },
}

impl GitWorkerError {
    /// True for failures of commands that talk to a remote.
    pub fn is_network(&self) -> bool {
        let command = match self {
            Self::SpawnFailed { command, .. }
            | Self::CommandFailed { command, .. }
            | Self::TimedOut { command, .. }
            | Self::Parse { command, .. } => command,
            Self::EmptyAddPaths => return false,
        };
        ["git fetch", "git pull", "git push"].iter().any(|prefix| command.starts_with(prefix))
    }
}

impl Display for GitWorkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitWorkerError::EmptyAddPaths => write!(f, "git add requires at least one path"),
            GitWorkerError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitWorkerError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
            GitWorkerError::TimedOut { command, after } => {
                write!(f, "`{command}` timed out after {}s", after.as_secs_f64())
            }
            GitWorkerError::Parse { command, message } => {
                write!(f, "unexpected output from `{command}`: {message}")
            }
        }
    }
}

impl Error for GitWorkerError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A single subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

pub type CommandFuture =
    Pin<Box<dyn Future<Output = Result<CommandResult, std::io::Error>> + Send + 'static>>;

/// Runs subprocesses. Expiry of `request.timeout` must surface as an
/// `io::ErrorKind::TimedOut` error and must not leave the child running.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, request: CommandRequest) -> CommandFuture;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(&self, request: CommandRequest) -> CommandFuture {
        Box::pin(async move {
            let mut command = tokio::process::Command::new(&request.program);
            command
                .args(&request.args)
                .current_dir(&request.cwd)
                .env("GIT_TERMINAL_PROMPT", "0")
                .stdin(Stdio::null())
                .kill_on_drop(true);

            let output = match tokio::time::timeout(request.timeout, command.output()).await {
                Ok(output) => output?,
                Err(_) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("timed out after {:?}", request.timeout),
                    ))
                }
            };

            Ok(CommandResult {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Timeouts applied to local and remote git operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitTimeouts {
    pub local: Duration,
    pub network: Duration,
}

impl Default for GitTimeouts {
    fn default() -> Self {
        Self { local: Duration::from_secs(30), network: Duration::from_secs(60) }
    }
}

#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
    timeouts: GitTimeouts,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self::with_executor(repo_path, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor, timeouts: GitTimeouts::default() }
    }

    pub fn with_timeouts(mut self, timeouts: GitTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn timeouts(&self) -> GitTimeouts {
        self.timeouts
    }

    // ── Repository inspection ──────────────────────────────────────

    /// Returns false when `repo_path` is not inside a git work tree.
    pub async fn is_work_tree(&self) -> Result<bool, GitWorkerError> {
        match self.local(args(&["rev-parse", "--is-inside-work-tree"])).await {
            Ok(output) => Ok(output.stdout.trim() == "true"),
            Err(GitWorkerError::CommandFailed { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Top-level directory of the work tree containing `repo_path`.
    pub async fn toplevel(&self) -> Result<PathBuf, GitWorkerError> {
        let output = self.local(args(&["rev-parse", "--show-toplevel"])).await?;
        Ok(PathBuf::from(output.stdout.trim()))
    }

    pub async fn git_dir(&self) -> Result<PathBuf, GitWorkerError> {
        let output = self.local(args(&["rev-parse", "--absolute-git-dir"])).await?;
        Ok(PathBuf::from(output.stdout.trim()))
    }

    pub async fn current_branch(&self) -> Result<String, GitWorkerError> {
        let output = self.local(args(&["rev-parse", "--abbrev-ref", "HEAD"])).await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn head(&self) -> Result<String, GitWorkerError> {
        let output = self.local(args(&["rev-parse", "HEAD"])).await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn commit_exists(&self, hash: &str) -> Result<bool, GitWorkerError> {
        match self.local(vec!["cat-file".into(), "-e".into(), format!("{hash}^{{commit}}")]).await
        {
            Ok(_) => Ok(true),
            Err(GitWorkerError::CommandFailed { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Working-tree changes, one entry per path (untracked directories expanded).
    pub async fn status(&self) -> Result<Vec<ChangedFile>, GitWorkerError> {
        let output = self
            .local(args(&["status", "--porcelain=v1", "-z", "--untracked-files=all"]))
            .await?;
        parse_porcelain_z(&output.stdout).map_err(|message| GitWorkerError::Parse {
            command: "git status --porcelain=v1 -z".to_string(),
            message,
        })
    }

    /// Name of the in-progress operation (merge, rebase, ...), if any.
    pub async fn in_progress_operation(&self) -> Result<Option<&'static str>, GitWorkerError> {
        let git_dir = self.git_dir().await?;
        Ok(IN_PROGRESS_MARKERS
            .iter()
            .find(|(marker, _)| git_dir.join(marker).exists())
            .map(|(_, operation)| *operation))
    }

    // ── Staging and committing ─────────────────────────────────────

    pub async fn add<S: AsRef<str>>(&self, paths: &[S]) -> Result<(), GitWorkerError> {
        if paths.is_empty() {
            return Err(GitWorkerError::EmptyAddPaths);
        }

        let mut command = args(&["add", "-A", "--"]);
        command.extend(paths.iter().map(|path| path.as_ref().to_string()));
        self.local(command).await.map(|_| ())
    }

    pub async fn staged_paths(&self) -> Result<Vec<String>, GitWorkerError> {
        let output = self.local(args(&["diff", "--cached", "--name-only", "-z"])).await?;
        Ok(output.stdout.split('\0').filter(|path| !path.is_empty()).map(str::to_string).collect())
    }

    pub async fn unstage<S: AsRef<str>>(&self, paths: &[S]) -> Result<(), GitWorkerError> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut command = args(&["reset", "-q", "--"]);
        command.extend(paths.iter().map(|path| path.as_ref().to_string()));
        self.local(command).await.map(|_| ())
    }

    pub async fn diff_cached(&self) -> Result<String, GitWorkerError> {
        let output = self.local(args(&["diff", "--cached", "--no-color", "-U3"])).await?;
        Ok(output.stdout)
    }

    /// Commit the index and return the new HEAD hash.
    pub async fn commit(&self, message: &str) -> Result<String, GitWorkerError> {
        self.local(vec!["commit".into(), "-q".into(), "-m".into(), message.to_string()]).await?;
        self.head().await
    }

    pub async fn revert(&self, hash: &str) -> Result<(), GitWorkerError> {
        self.local(vec!["revert".into(), "--no-edit".into(), hash.to_string()]).await.map(|_| ())
    }

    pub async fn reset_soft(&self, target: &str) -> Result<(), GitWorkerError> {
        self.local(vec!["reset".into(), "--soft".into(), target.to_string()]).await.map(|_| ())
    }

    // ── Remote operations ──────────────────────────────────────────

    pub async fn fetch(&self, remote: &str) -> Result<(), GitWorkerError> {
        self.network(vec!["fetch".into(), remote.to_string()]).await.map(|_| ())
    }

    /// Commits `(ahead, behind)` of `remote/branch`.
    pub async fn ahead_behind(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<(u32, u32), GitWorkerError> {
        let range = format!("{branch}...{remote}/{branch}");
        let command = vec!["rev-list".into(), "--left-right".into(), "--count".into(), range];
        let rendered = render("git", &command);
        let output = self.local(command).await?;

        let mut counts = output.stdout.split_whitespace().map(str::parse::<u32>);
        match (counts.next(), counts.next()) {
            (Some(Ok(ahead)), Some(Ok(behind))) => Ok((ahead, behind)),
            _ => Err(GitWorkerError::Parse {
                command: rendered,
                message: format!("expected two counts, got `{}`", output.stdout.trim()),
            }),
        }
    }

    pub async fn unpushed_count(&self, remote: &str, branch: &str) -> Result<u32, GitWorkerError> {
        let command = vec!["rev-list".into(), "--count".into(), format!("{remote}/{branch}..HEAD")];
        let rendered = render("git", &command);
        let output = self.local(command).await?;
        output.stdout.trim().parse().map_err(|_| GitWorkerError::Parse {
            command: rendered,
            message: format!("expected a count, got `{}`", output.stdout.trim()),
        })
    }

    pub async fn pull_rebase(&self, remote: &str, branch: &str) -> Result<(), GitWorkerError> {
        let command = vec![
            "pull".into(),
            "--rebase".into(),
            "--autostash".into(),
            remote.to_string(),
            branch.to_string(),
        ];
        self.network(command).await.map(|_| ())
    }

    pub async fn rebase_abort(&self) -> Result<(), GitWorkerError> {
        self.local(args(&["rebase", "--abort"])).await.map(|_| ())
    }

    pub async fn push(&self, remote: &str, branch: &str) -> Result<(), GitWorkerError> {
        self.network(vec!["push".into(), remote.to_string(), branch.to_string()]).await.map(|_| ())
    }

    // ── Raw execution ──────────────────────────────────────────────

    /// Run an arbitrary program in the repository (lint/test gates).
    pub async fn run_program(
        &self,
        program: &str,
        program_args: &[String],
        timeout: Duration,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(program, program_args.to_vec(), timeout).await
    }

    async fn local(&self, command: Vec<String>) -> Result<GitCommandOutput, GitWorkerError> {
        self.run("git", command, self.timeouts.local).await
    }

    async fn network(&self, command: Vec<String>) -> Result<GitCommandOutput, GitWorkerError> {
        self.run("git", command, self.timeouts.network).await
    }

    async fn run(
        &self,
        program: &str,
        command_args: Vec<String>,
        timeout: Duration,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        let command = render(program, &command_args);
        trace!(%command, "running subprocess");

        let request = CommandRequest {
            program: program.to_string(),
            args: command_args,
            cwd: self.repo_path.clone(),
            timeout,
        };
        let result = self.executor.execute(request).await.map_err(|error| {
            if error.kind() == std::io::ErrorKind::TimedOut {
                GitWorkerError::TimedOut { command: command.clone(), after: timeout }
            } else {
                GitWorkerError::SpawnFailed { command: command.clone(), message: error.to_string() }
            }
        })?;

        if result.success {
            return Ok(GitCommandOutput { stdout: result.stdout, stderr: result.stderr });
        }

        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };
        debug!(%command, code = ?result.code, stderr = %stderr.trim(), "subprocess failed");

        Err(GitWorkerError::CommandFailed { command, code: result.code, stderr })
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

fn render(program: &str, command_args: &[String]) -> String {
    if command_args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", command_args.join(" "))
    }
}

/// Parse `git status --porcelain=v1 -z` output.
///
/// Entries are `XY <path>` separated by NUL; renames and copies are followed
/// by an extra NUL-terminated entry holding the original path.
pub fn parse_porcelain_z(output: &str) -> Result<Vec<ChangedFile>, String> {
    let mut files = Vec::new();
    let mut entries = output.split('\0').filter(|entry| !entry.is_empty());

    while let Some(entry) = entries.next() {
        if entry.len() < 4 || !entry.is_char_boundary(2) || entry.as_bytes()[2] != b' ' {
            return Err(format!("malformed status entry `{entry}`"));
        }

        let (code, path) = (&entry[..2], &entry[3..]);
        let status = FileStatus::from_porcelain(code);
        if matches!(status, FileStatus::Renamed | FileStatus::Copied) {
            // Original path of the rename; the new path is what gets staged.
            entries.next();
        }
        files.push(ChangedFile::new(status, path));
    }

    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Invocation {
        pub program: String,
        pub args: Vec<String>,
        pub cwd: PathBuf,
        pub timeout: Duration,
    }

    /// Scripted executor: records every request and replays queued results.
    /// An exhausted queue answers with an empty success.
    #[derive(Clone, Default)]
    pub(crate) struct MockExecutor {
        calls: Arc<Mutex<Vec<Invocation>>>,
        responses: Arc<Mutex<VecDeque<Result<CommandResult, std::io::Error>>>>,
    }

    impl MockExecutor {
        pub(crate) fn new(responses: Vec<Result<CommandResult, std::io::Error>>) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            }
        }

        pub(crate) fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().expect("mock calls lock poisoned").clone()
        }

        pub(crate) fn arg_lists(&self) -> Vec<Vec<String>> {
            self.calls().into_iter().map(|call| call.args).collect()
        }
    }

    impl CommandExecutor for MockExecutor {
        fn execute(&self, request: CommandRequest) -> CommandFuture {
            self.calls.lock().expect("mock calls lock poisoned").push(Invocation {
                program: request.program,
                args: request.args,
                cwd: request.cwd,
                timeout: request.timeout,
            });

            let response = self
                .responses
                .lock()
                .expect("mock responses lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Ok(ok("")));
            Box::pin(async move { response })
        }
    }

    pub(crate) fn ok(stdout: &str) -> CommandResult {
        CommandResult { success: true, code: Some(0), stdout: stdout.to_string(), stderr: String::new() }
    }

    pub(crate) fn fail(code: i32, stderr: &str) -> CommandResult {
        CommandResult {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[tokio::test]
    async fn status_parses_porcelain_entries() {
        let mock = MockExecutor::new(vec![Ok(ok(" M README.md\0?? src/new.rs\0D  old.txt\0"))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let files = worker.status().await.expect("status should succeed");

        assert_eq!(
            files,
            vec![
                ChangedFile::new(FileStatus::Modified, "README.md"),
                ChangedFile::new(FileStatus::Untracked, "src/new.rs"),
                ChangedFile::new(FileStatus::Deleted, "old.txt"),
            ]
        );
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "git");
        assert_eq!(calls[0].args, vec!["status", "--porcelain=v1", "-z", "--untracked-files=all"]);
        assert_eq!(calls[0].cwd, PathBuf::from("/tmp/repo"));
    }

    #[test]
    fn porcelain_rename_skips_original_path() {
        let files = parse_porcelain_z("R  src/new name.rs\0src/old.rs\0 M a.txt\0").unwrap();
        assert_eq!(
            files,
            vec![
                ChangedFile::new(FileStatus::Renamed, "src/new name.rs"),
                ChangedFile::new(FileStatus::Modified, "a.txt"),
            ]
        );
    }

    #[test]
    fn porcelain_rejects_garbage() {
        assert!(parse_porcelain_z("xx\0").is_err());
    }

    #[tokio::test]
    async fn add_requires_at_least_one_path() {
        let mock = MockExecutor::new(Vec::new());
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let error = worker.add::<&str>(&[]).await.expect_err("add should fail");
        assert_eq!(error, GitWorkerError::EmptyAddPaths);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn add_separates_paths_from_options() {
        let mock = MockExecutor::new(Vec::new());
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        worker.add(&["-weird.txt", "src/lib.rs"]).await.expect("add should succeed");
        assert_eq!(mock.arg_lists()[0], vec!["add", "-A", "--", "-weird.txt", "src/lib.rs"]);
    }

    #[tokio::test]
    async fn pull_rebase_returns_command_failure_with_stderr() {
        let mock = MockExecutor::new(vec![Ok(fail(1, "CONFLICT (content)\n"))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let error = worker.pull_rebase("origin", "feature").await.expect_err("pull should fail");
        assert_eq!(
            error,
            GitWorkerError::CommandFailed {
                command: "git pull --rebase --autostash origin feature".to_string(),
                code: Some(1),
                stderr: "CONFLICT (content)\n".to_string(),
            }
        );
        assert!(error.is_network());
    }

    #[tokio::test]
    async fn commit_passes_message_as_single_argument_and_returns_head() {
        let mock = MockExecutor::new(vec![Ok(ok("")), Ok(ok("abc123\n"))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let hash = worker.commit("docs: update readme\n\n- Update README.md").await.unwrap();

        assert_eq!(hash, "abc123");
        let calls = mock.arg_lists();
        assert_eq!(calls[0], vec!["commit", "-q", "-m", "docs: update readme\n\n- Update README.md"]);
        assert_eq!(calls[1], vec!["rev-parse", "HEAD"]);
    }

    #[tokio::test]
    async fn network_commands_use_network_timeout() {
        let mock = MockExecutor::new(Vec::new());
        let timeouts =
            GitTimeouts { local: Duration::from_secs(5), network: Duration::from_secs(90) };
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone()).with_timeouts(timeouts);

        worker.push("origin", "feature").await.unwrap();
        worker.current_branch().await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].args, vec!["push", "origin", "feature"]);
        assert_eq!(calls[0].timeout, Duration::from_secs(90));
        assert_eq!(calls[1].timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn timed_out_executor_maps_to_timed_out_error() {
        let mock = MockExecutor::new(vec![Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "too slow",
        ))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);

        let error = worker.fetch("origin").await.expect_err("fetch should time out");
        assert_eq!(
            error,
            GitWorkerError::TimedOut {
                command: "git fetch origin".to_string(),
                after: Duration::from_secs(60),
            }
        );
        assert!(error.is_network());
    }

    #[tokio::test]
    async fn ahead_behind_parses_counts() {
        let mock = MockExecutor::new(vec![Ok(ok("2\t3\n"))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        assert_eq!(worker.ahead_behind("origin", "dev").await.unwrap(), (2, 3));
        assert_eq!(
            mock.arg_lists()[0],
            vec!["rev-list", "--left-right", "--count", "dev...origin/dev"]
        );
    }

    #[tokio::test]
    async fn ahead_behind_rejects_unexpected_output() {
        let mock = MockExecutor::new(vec![Ok(ok("nonsense"))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);

        let error = worker.ahead_behind("origin", "dev").await.unwrap_err();
        assert!(matches!(error, GitWorkerError::Parse { .. }));
    }

    #[tokio::test]
    async fn commit_exists_is_false_on_missing_object() {
        let mock = MockExecutor::new(vec![Ok(fail(128, "fatal: Not a valid object name"))]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        assert!(!worker.commit_exists("deadbeef").await.unwrap());
        assert_eq!(mock.arg_lists()[0], vec!["cat-file", "-e", "deadbeef^{commit}"]);
    }

    #[tokio::test]
    async fn is_work_tree_false_outside_repository() {
        let mock = MockExecutor::new(vec![Ok(fail(128, "fatal: not a git repository"))]);
        let worker = GitWorker::with_executor("/tmp/plain", mock);
        assert!(!worker.is_work_tree().await.unwrap());
    }

    #[tokio::test]
    async fn in_progress_operation_detects_merge_head() {
        let tmp = tempfile::TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(git_dir.join("MERGE_HEAD"), "abc\n").unwrap();

        let mock = MockExecutor::new(vec![
            Ok(ok(&format!("{}\n", git_dir.display()))),
            Ok(ok(&format!("{}\n", git_dir.display()))),
        ]);
        let worker = GitWorker::with_executor(tmp.path(), mock);

        assert_eq!(worker.in_progress_operation().await.unwrap(), Some("merge"));
        std::fs::remove_file(git_dir.join("MERGE_HEAD")).unwrap();
        assert_eq!(worker.in_progress_operation().await.unwrap(), None);
    }

    #[tokio::test]
    async fn process_executor_times_out_slow_commands() {
        if cfg!(not(unix)) {
            return;
        }
        let executor = ProcessCommandExecutor;
        let request = CommandRequest {
            program: "sleep".to_string(),
            args: vec!["5".to_string()],
            cwd: std::env::temp_dir(),
            timeout: Duration::from_millis(100),
        };

        let error = executor.execute(request).await.expect_err("sleep should time out");
        assert_eq!(error.kind(), std::io::ErrorKind::TimedOut);
    }
}
