//! CLI-specific functionality
//!
//! Argument parsing and progress output for the `berth` binary.

pub mod args;
pub mod progress;

pub use args::{Args, Commands, ExecutionMode, RunConfig};
