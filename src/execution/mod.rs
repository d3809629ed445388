//! Task execution engine.
//!
//! A task run is driven entirely by an event log. Rules look at the events
//! recorded so far and decide which steps are ready; the scheduler executes
//! ready steps on a bounded set of workers and appends whatever the steps
//! report back. Teardown is planned from the same log once the task container
//! exits, a step fails or the run is cancelled.
//!
//! - [`graph`]: the containers a task needs and the edges between them
//! - [`rules`]: pure predicates that turn events into ready steps
//! - [`runner`]: executes a step against a [`ContainerRuntime`]
//! - [`scheduler`]: the coordinating loop and the final [`TaskOutcome`]

pub mod event_log;
pub mod events;
pub mod graph;
pub mod request_factory;
pub mod rules;
pub mod runner;
pub mod scheduler;
pub mod steps;

pub use event_log::{EventLog, EventLogError};
pub use events::{EventQuery, TaskEvent};
pub use graph::{GraphError, TaskGraph};
pub use request_factory::{BuilderError, ContainerCreationRequestFactory};
pub use rules::{RuleEvaluation, RuleSet, TaskStepRule};
pub use runner::StepRunner;
pub use scheduler::{
    RuleState, SchedulerConfig, SchedulerError, TaskOutcome, TaskPhase, TaskResult, TaskScheduler,
};
pub use steps::{ContainerRole, Entity, StepAction, StepKey, TaskStep};

use crate::config::{ConfigError, ProjectConfig};
use crate::docker::ContainerRuntime;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Errors that stop a task run before anything is scheduled.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A short identifier that keeps the resources of concurrent runs apart.
pub fn generate_run_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Options for one task run.
#[derive(Debug, Clone, Default)]
pub struct TaskRunOptions {
    pub scheduler: SchedulerConfig,
    /// Defaults to a fresh [`generate_run_id`]
    pub run_id: Option<String>,
    pub use_tty: bool,
}

/// Build the graph, rules and scheduler for a task of a project.
///
/// # Errors
///
/// Returns an error if the task is unknown or its dependency graph is invalid.
pub fn prepare_task_run(
    project: &ProjectConfig,
    task_name: &str,
    runtime: Arc<dyn ContainerRuntime>,
    options: TaskRunOptions,
) -> Result<TaskScheduler, ExecutionError> {
    let task = project.task(task_name)?;
    let graph = TaskGraph::build(task, &project.containers)?;
    let run_id = options.run_id.unwrap_or_else(generate_run_id);

    info!(
        "Prepared run {} of task '{}' with containers: {}",
        run_id,
        task_name,
        graph.nodes().join(", ")
    );

    let rules = RuleSet::for_task(&graph, &project.project_name, &run_id);
    let factory = ContainerCreationRequestFactory::new(
        &project.project_directory,
        &project.project_name,
        &run_id,
        task.run.clone(),
    )
    .with_terminal(options.use_tty, false);
    let runner = StepRunner::new(runtime, factory);

    Ok(TaskScheduler::new(graph, rules, runner, options.scheduler))
}
