pub mod unified;

pub use unified::{FileDiff, UnifiedDiff};
