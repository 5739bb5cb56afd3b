// Repository-relative path normalization: `/` separators, traversal rejection.
//
// Every path the daemon compares (watch events, ignore patterns, git status
// output, ledger entries) goes through here first so matching is done on a
// single canonical form.

use std::path::{Component, Path};

use thiserror::Error;

/// Maximum allowed path length in characters.
const MAX_PATH_CHARS: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,

    #[error("path `{0}` is outside the repository root")]
    OutsideRoot(String),
}

/// Normalize a repository-relative path.
///
/// Rules:
/// - Convert all separators to `/`
/// - Collapse consecutive `/` and drop `.` components
/// - Strip leading and trailing `/`
/// - Reject `..` components and null bytes
/// - Reject empty paths
pub fn normalize_repo_path(input: &str) -> Result<String, PathError> {
    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let unified = input.replace('\\', "/");
    let mut components = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(PathError::Traversal("..".to_string())),
            other => components.push(other),
        }
    }

    if components.is_empty() {
        return Err(PathError::Empty);
    }

    let result = components.join("/");
    if result.chars().count() > MAX_PATH_CHARS {
        return Err(PathError::TooLong);
    }

    Ok(result)
}

/// Express an absolute path relative to `root` in normalized form.
///
/// Both paths are compared component-wise, so `/repo-other/x` is not
/// considered inside `/repo`.
pub fn relative_to_root(root: &Path, path: &Path) -> Result<String, PathError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PathError::OutsideRoot(path.display().to_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => return Err(PathError::Traversal("..".to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::OutsideRoot(path.display().to_string()))
            }
        }
    }

    normalize_repo_path(&parts.join("/"))
}
