//! # Berth
//!
//! Runs development tasks inside throwaway Docker containers. A project file
//! describes containers (built from a local directory or pulled from a
//! registry) and tasks that run in one of them. Running a task brings up every
//! container it depends on, runs the task container to completion and then
//! removes everything again, including after a failure.
//!
//! ## Architecture Overview
//!
//! - **[`config`]**: TOML project model, duration parsing and file discovery
//! - **[`execution`]**: dependency graph, event log, step rules and the scheduler
//! - **[`docker`]**: container creation requests and the runtime boundary
//! - **[`cli`]**: argument parsing and progress output for the binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use berth::config::ConfigDiscovery;
//! use berth::docker::DockerClient;
//! use berth::execution::{TaskRunOptions, prepare_task_run};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let project = ConfigDiscovery::load(None)?;
//!     let runtime = Arc::new(DockerClient::new().await?);
//!
//!     let outcome = prepare_task_run(&project, "test", runtime, TaskRunOptions::default())?
//!         .run()
//!         .await;
//!
//!     println!("{:?}", outcome.result);
//!     Ok(())
//! }
//! ```

/// Project configuration.
///
/// Containers, tasks and the discovery of the configuration file.
pub mod config;

/// Task execution engine.
///
/// Builds the dependency graph of a task, evaluates step rules against the
/// event log and drives the steps to completion and teardown.
pub mod execution;

/// Container runtime boundary.
///
/// Creation request wire format, the `ContainerRuntime` trait and its
/// bollard-backed implementation.
pub mod docker;

/// Environment constants and naming helpers.
///
/// Centralizes file names, labels and the naming scheme for images,
/// containers and networks.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use config::{ConfigDiscovery, ConfigError, ProjectConfig};
pub use execution::{
    ExecutionError, SchedulerConfig, TaskOutcome, TaskResult, TaskRunOptions, TaskScheduler,
    prepare_task_run,
};
