//! Reference host for the showgraph engine.
//!
//! Loads a show document, normalizes its groups and ticks the graph at a fixed rate.
//! Media playback collaborators report finished clips as `finish <nodeId>` lines on
//! stdin; every N ticks a JSON tick log is written to stdout.

pub mod config;
pub mod show;

pub use config::{ConfigError, RunnerConfig};
pub use show::*;
