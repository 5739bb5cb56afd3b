// autopilot-common: shared types and utilities for the autopilot workspace

pub mod diff;
pub mod path;
pub mod types;
