// Unified diff parsing (`git diff --cached` output).
//
// Splits a multi-file diff into per-file addition and deletion line lists.
// The current file is tracked from each `diff --git` header; header lines
// (`---`, `+++`, mode lines) are only recognised before a file's first hunk.

use serde::Serialize;

/// Changes recorded for a single file in a unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub old_path: Option<String>,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_binary: bool,
    pub hunks: usize,
    pub additions: Vec<String>,
    pub deletions: Vec<String>,
}

impl FileDiff {
    fn new(path: String, old_path: Option<String>) -> Self {
        let old_path = old_path.filter(|old| old != &path);
        Self { path, old_path, ..Self::default() }
    }

    pub fn changed_lines(&self) -> usize {
        self.additions.len() + self.deletions.len()
    }
}

/// A parsed multi-file unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnifiedDiff {
    pub files: Vec<FileDiff>,
}

impl UnifiedDiff {
    pub fn parse(text: &str) -> Self {
        let mut files: Vec<FileDiff> = Vec::new();
        let mut in_hunk = false;

        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("diff --git ") {
                let (old_path, new_path) = split_git_header(rest);
                files.push(FileDiff::new(new_path, old_path));
                in_hunk = false;
                continue;
            }

            let Some(current) = files.last_mut() else {
                continue;
            };

            if line.starts_with("@@") {
                current.hunks += 1;
                in_hunk = true;
                continue;
            }

            if !in_hunk {
                if line.starts_with("new file mode") {
                    current.is_new = true;
                } else if line.starts_with("deleted file mode") {
                    current.is_deleted = true;
                } else if line.starts_with("Binary files") || line == "GIT binary patch" {
                    current.is_binary = true;
                } else if let Some(target) = line.strip_prefix("rename to ") {
                    current.path = target.to_string();
                } else if let Some(target) = line.strip_prefix("+++ ") {
                    if let Some(path) = target.strip_prefix("b/") {
                        current.path = path.to_string();
                    }
                }
                continue;
            }

            if let Some(added) = line.strip_prefix('+') {
                current.additions.push(added.to_string());
            } else if let Some(removed) = line.strip_prefix('-') {
                current.deletions.push(removed.to_string());
            }
        }

        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn hunk_count(&self) -> usize {
        self.files.iter().map(|file| file.hunks).sum()
    }

    pub fn file(&self, path: &str) -> Option<&FileDiff> {
        self.files.iter().find(|file| file.path == path)
    }

    /// All added lines paired with the file they were added to.
    pub fn additions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files
            .iter()
            .flat_map(|file| file.additions.iter().map(move |line| (file.path.as_str(), line.as_str())))
    }

    /// All removed lines paired with the file they were removed from.
    pub fn deletions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files
            .iter()
            .flat_map(|file| file.deletions.iter().map(move |line| (file.path.as_str(), line.as_str())))
    }
}

/// Split `a/<old> b/<new>` from a `diff --git` header.
fn split_git_header(rest: &str) -> (Option<String>, String) {
    match rest.rfind(" b/") {
        Some(index) => {
            let old = rest[..index].strip_prefix("a/").map(str::to_string);
            (old, rest[index + 3..].to_string())
        }
        None => (None, rest.trim().to_string()),
    }
}
