pub mod normalize;

pub use normalize::{normalize_repo_path, relative_to_root, PathError};
