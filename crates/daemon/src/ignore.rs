// Relevance filter for repository paths.
//
// Built-in exclusions are unioned with user patterns from `.autopilotignore`
// and `config.ignore`. One matcher instance is shared by the filesystem
// watcher and by the scheduler's check of the staged set before committing.

use std::path::Path;

use autopilot_common::path::normalize_repo_path;

use crate::config::ConfigError;

pub const IGNORE_FILE: &str = ".autopilotignore";

/// Directories never watched or committed, matched on any path component.
const BUILTIN_DIRS: &[&str] = &[
    ".git",
    ".autopilot",
    "node_modules",
    "dist",
    "build",
    "target",
    ".next",
    "coverage",
    ".vscode",
    ".idea",
];

/// The daemon's own files, matched on the file name.
const BUILTIN_FILES: &[&str] = &["autopilot.log", "autopilot.pid", "daemon.lock", ".DS_Store"];

/// Patterns written by `init` into a fresh `.autopilotignore`.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules/",
    "dist/",
    "build/",
    ".next/",
    ".env",
    ".env.*",
    "coverage/",
    "*.log",
    ".DS_Store",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    /// `name` with no slash: any component equal to it.
    Name(String),
    /// `a/b`: exactly that relative path.
    Exact(String),
    /// `dir/`: the directory and everything under it.
    Dir(String),
    /// Contains `*` or `?`: matched on the file name, or on the whole path
    /// when the pattern has a slash.
    Glob { pattern: String, anchored: bool },
}

impl Pattern {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        if let Some(dir) = trimmed.strip_suffix('/') {
            let dir = dir.trim_start_matches('/');
            return (!dir.is_empty()).then(|| Self::Dir(dir.to_string()));
        }

        let body = trimmed.trim_start_matches('/');
        if body.is_empty() {
            return None;
        }
        let anchored = body.contains('/') || trimmed.starts_with('/');

        if body.contains(['*', '?']) {
            return Some(Self::Glob { pattern: body.to_string(), anchored });
        }
        if anchored {
            Some(Self::Exact(body.to_string()))
        } else {
            Some(Self::Name(body.to_string()))
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Name(name) => path.split('/').any(|component| component == name),
            Self::Exact(exact) => path == exact,
            Self::Dir(dir) => {
                if dir.contains('/') {
                    path == dir || path.starts_with(&format!("{dir}/"))
                } else {
                    path.split('/').any(|component| component == dir)
                }
            }
            Self::Glob { pattern, anchored: true } => wildcard_match(pattern, path),
            Self::Glob { pattern, anchored: false } => {
                let file_name = path.rsplit('/').next().unwrap_or(path);
                wildcard_match(pattern, file_name)
            }
        }
    }
}

/// Decides whether a repository path is relevant to the daemon.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
}

impl IgnoreMatcher {
    /// Matcher with only the built-in exclusions plus `patterns`.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns =
            patterns.into_iter().filter_map(|pattern| Pattern::parse(pattern.as_ref())).collect();
        Self { patterns }
    }

    /// Read `.autopilotignore` from `repo_root` and union it with `extra`.
    /// A missing file is fine; an unreadable one is a config error.
    pub fn load(repo_root: &Path, extra: &[String]) -> Result<Self, ConfigError> {
        let path = repo_root.join(IGNORE_FILE);
        let file_patterns = match std::fs::read_to_string(&path) {
            Ok(contents) => parse_ignore_file(&contents),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        Ok(Self::new(file_patterns.iter().map(String::as_str).chain(extra.iter().map(String::as_str))))
    }

    /// True when the repo-relative `path` must be neither watched nor staged.
    /// Paths that fail normalization (traversal, empty) are ignored.
    pub fn is_ignored(&self, path: &str) -> bool {
        let Ok(path) = normalize_repo_path(path) else {
            return true;
        };

        if path.split('/').any(|component| BUILTIN_DIRS.contains(&component)) {
            return true;
        }
        let file_name = path.rsplit('/').next().unwrap_or(&path);
        if BUILTIN_FILES.contains(&file_name) {
            return true;
        }

        self.patterns.iter().any(|pattern| pattern.matches(&path))
    }

    #[cfg(test)]
    fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

/// Split an ignore file into patterns, dropping blanks and `#` comments.
pub fn parse_ignore_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Contents for a fresh ignore file.
pub fn default_ignore_file() -> String {
    let mut contents = String::from("# Paths autopilot never watches or commits\n");
    for pattern in DEFAULT_IGNORE_PATTERNS {
        contents.push_str(pattern);
        contents.push('\n');
    }
    contents
}

/// `*` matches any run of characters except `/`; `?` matches one character.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '?' && text[t] != '/' || pattern[p] == text[t])
        {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            if text[star_t] == '/' {
                return false;
            }
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── Built-in exclusions ────────────────────────────────────────

    #[test]
    fn builtin_directories_are_always_ignored() {
        let matcher = IgnoreMatcher::default();
        assert!(matcher.is_ignored(".git/index"));
        assert!(matcher.is_ignored(".autopilot/state.json"));
        assert!(matcher.is_ignored("web/node_modules/react/index.js"));
        assert!(matcher.is_ignored(".vscode/settings.json"));
        assert!(matcher.is_ignored("dist/bundle.js"));
        assert!(!matcher.is_ignored("src/main.rs"));
    }

    #[test]
    fn daemon_log_and_lock_files_are_ignored() {
        let matcher = IgnoreMatcher::default();
        assert!(matcher.is_ignored("autopilot.log"));
        assert!(matcher.is_ignored("nested/autopilot.log"));
        assert!(matcher.is_ignored("daemon.lock"));
    }

    #[test]
    fn traversal_paths_are_ignored() {
        let matcher = IgnoreMatcher::default();
        assert!(matcher.is_ignored("../outside.txt"));
        assert!(matcher.is_ignored(""));
    }

    // ── User patterns ──────────────────────────────────────────────

    #[test]
    fn exact_relative_path() {
        let matcher = IgnoreMatcher::new(["config/local.json"]);
        assert!(matcher.is_ignored("config/local.json"));
        assert!(!matcher.is_ignored("config/other.json"));
        assert!(!matcher.is_ignored("x/config/local.json"));
    }

    #[test]
    fn bare_name_matches_any_component() {
        let matcher = IgnoreMatcher::new([".env"]);
        assert!(matcher.is_ignored(".env"));
        assert!(matcher.is_ignored("services/api/.env"));
        assert!(!matcher.is_ignored(".envrc"));
    }

    #[test]
    fn directory_prefix() {
        let matcher = IgnoreMatcher::new(["tmp/", "assets/generated/"]);
        assert!(matcher.is_ignored("tmp/scratch.txt"));
        assert!(matcher.is_ignored("pkg/tmp/scratch.txt"));
        assert!(matcher.is_ignored("assets/generated/icons.svg"));
        assert!(!matcher.is_ignored("assets/source/icons.svg"));
        assert!(!matcher.is_ignored("tmpfile.txt"));
    }

    #[test]
    fn extension_suffix() {
        let matcher = IgnoreMatcher::new(["*.log", ".env.*"]);
        assert!(matcher.is_ignored("server.log"));
        assert!(matcher.is_ignored("logs/today.log"));
        assert!(matcher.is_ignored(".env.production"));
        assert!(!matcher.is_ignored("server.log.txt"));
        assert!(!matcher.is_ignored("catalog.rs"));
    }

    #[test]
    fn anchored_glob_does_not_cross_directories() {
        let matcher = IgnoreMatcher::new(["fixtures/*.json"]);
        assert!(matcher.is_ignored("fixtures/a.json"));
        assert!(!matcher.is_ignored("fixtures/deep/a.json"));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let patterns = parse_ignore_file("# comment\n\n  *.tmp  \n#another\nsecrets/\n");
        assert_eq!(patterns, vec!["*.tmp", "secrets/"]);
    }

    // ── Loading ────────────────────────────────────────────────────

    #[test]
    fn load_unions_file_and_config_patterns() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(IGNORE_FILE), "*.tmp\n").unwrap();

        let matcher = IgnoreMatcher::load(tmp.path(), &["private/".to_string()]).unwrap();
        assert!(matcher.is_ignored("a.tmp"));
        assert!(matcher.is_ignored("private/key.txt"));
        assert_eq!(matcher.pattern_count(), 2);
    }

    #[test]
    fn load_without_ignore_file_uses_builtins_only() {
        let tmp = TempDir::new().unwrap();
        let matcher = IgnoreMatcher::load(tmp.path(), &[]).unwrap();
        assert_eq!(matcher.pattern_count(), 0);
        assert!(matcher.is_ignored(".git/HEAD"));
    }

    #[test]
    fn default_file_round_trips_through_parser() {
        let patterns = parse_ignore_file(&default_ignore_file());
        assert_eq!(patterns.len(), DEFAULT_IGNORE_PATTERNS.len());
    }

    #[test]
    fn wildcard_edge_cases() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(!wildcard_match("a?c", "ac"));
        assert!(wildcard_match("*.tar.*", "x.tar.gz"));
        assert!(!wildcard_match("*.rs", "a/b.rs"));
    }
}
