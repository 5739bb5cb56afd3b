// autopilot-daemon library: the watch → decide → act core and its control surface.

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod git;
pub mod identity;
pub mod ignore;
pub mod outbox;
pub mod runtime;
pub mod safety;
pub mod scheduler;
pub mod security;
pub mod startup;
pub mod state;
pub mod watcher;

pub use error::{AutopilotError, Result};
