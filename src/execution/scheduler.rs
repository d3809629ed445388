use crate::execution::event_log::EventLog;
use crate::execution::events::{EventQuery, TaskEvent};
use crate::execution::graph::TaskGraph;
use crate::execution::rules::{RuleEvaluation, RuleSet, teardown_rules};
use crate::execution::runner::StepRunner;
use crate::execution::steps::{StepKey, TaskStep};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Scheduler configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on steps executing at the same time
    pub max_parallelism: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("No step is ready and none is running, the task cannot make progress")]
    Stalled,

    #[error("The task container never ran")]
    TaskNeverRan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    NotReady,
    Ready,
    Executing,
    Completed,
    Failed,
    /// Became ready after the run stopped bringing things up; never dispatched.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Running,
    AllCompleted,
    CleaningUpAfterFailure,
    CleaningUpAfterCancellation,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Succeeded { exit_code: i64 },
    Failed { step: String, message: String },
    Cancelled,
}

/// What a task run produced.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub result: TaskResult,
    /// Teardown steps that failed, in the order they failed
    pub cleanup_warnings: Vec<String>,
    /// Phases the run went through, ending with [`TaskPhase::Finished`]
    pub phases: Vec<TaskPhase>,
    pub events: EventLog,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, TaskResult::Succeeded { exit_code: 0 })
    }
}

struct RunState {
    log: EventLog,
    states: HashMap<StepKey, RuleState>,
    ready: VecDeque<TaskStep>,
    in_flight: HashMap<Id, TaskStep>,
    phase: TaskPhase,
    phases: Vec<TaskPhase>,
    first_failure: Option<(String, String)>,
    cancelled: bool,
    cleanup_warnings: Vec<String>,
}

impl RunState {
    fn new(rules: &RuleSet) -> Self {
        Self {
            log: EventLog::new(),
            states: rules
                .keys()
                .iter()
                .map(|key| (key.clone(), RuleState::NotReady))
                .collect(),
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            phase: TaskPhase::Running,
            phases: vec![TaskPhase::Running],
            first_failure: None,
            cancelled: false,
            cleanup_warnings: Vec::new(),
        }
    }

    /// A failure or cancellation means nothing new is brought up.
    fn stopping(&self) -> bool {
        self.first_failure.is_some() || self.cancelled
    }

    fn enter(&mut self, phase: TaskPhase) {
        info!("Entering {:?}", phase);
        self.phase = phase;
        self.phases.push(phase);
    }

    fn skip_pending(&mut self) {
        for step in self.ready.drain(..) {
            debug!("Skipping {}", step);
            self.states.insert(step.key(), RuleState::Skipped);
        }
    }
}

/// Drives one task run: evaluates rules against the event log, executes
/// ready steps on a bounded worker pool and tears everything down at the end.
pub struct TaskScheduler {
    graph: TaskGraph,
    rules: RuleSet,
    runner: Arc<StepRunner>,
    config: SchedulerConfig,
    listener: Option<mpsc::UnboundedSender<TaskEvent>>,
    cancellation: Option<watch::Receiver<bool>>,
}

impl TaskScheduler {
    pub fn new(graph: TaskGraph, rules: RuleSet, runner: StepRunner, config: SchedulerConfig) -> Self {
        Self {
            graph,
            rules,
            runner: Arc::new(runner),
            config,
            listener: None,
            cancellation: None,
        }
    }

    /// Receive every event as it is recorded.
    pub fn with_event_listener(mut self, listener: mpsc::UnboundedSender<TaskEvent>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Cancel the run once `true` is sent on the channel.
    pub fn with_cancellation(mut self, cancellation: watch::Receiver<bool>) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub async fn run(mut self) -> TaskOutcome {
        let mut state = RunState::new(&self.rules);
        let mut workers: JoinSet<Vec<TaskEvent>> = JoinSet::new();
        let mut cancellation = self.cancellation.take();

        info!(
            "Running task '{}' in container '{}'",
            self.graph.task().name,
            self.graph.task_container_name()
        );

        loop {
            if state.phase == TaskPhase::Running {
                if let Some(receiver) = &cancellation {
                    if *receiver.borrow() && !state.cancelled {
                        info!("Task run cancelled");
                        state.cancelled = true;
                    }
                }

                if state.stopping() {
                    state.skip_pending();
                }

                if (state.stopping() || self.task_exited(&state)) && workers.is_empty() {
                    self.begin_cleanup(&mut state);
                }
            }

            self.evaluate(&mut state);
            self.dispatch(&mut state, &mut workers);

            if workers.is_empty() {
                if state.phase != TaskPhase::Running {
                    break;
                }

                if !state.stopping() && !self.task_exited(&state) {
                    error!("No step is ready and none is running");
                    state.first_failure =
                        Some(("task".to_string(), SchedulerError::Stalled.to_string()));
                }
                continue;
            }

            let watch_cancellation = state.phase == TaskPhase::Running && !state.cancelled;
            tokio::select! {
                Some(joined) = workers.join_next_with_id() => {
                    self.complete(&mut state, joined);
                }
                _ = cancellation_requested(&mut cancellation), if watch_cancellation => {
                    info!("Task run cancelled, waiting for running steps to finish");
                    state.cancelled = true;
                }
                else => {}
            }
        }

        state.enter(TaskPhase::Finished);
        info!("Task '{}' finished", self.graph.task().name);

        let exit_code = state
            .log
            .snapshot()
            .exit_code_of(self.graph.task_container_name());
        let result = match (state.first_failure, state.cancelled, exit_code) {
            (Some((step, message)), _, _) => TaskResult::Failed { step, message },
            (None, true, _) => TaskResult::Cancelled,
            (None, false, Some(exit_code)) => TaskResult::Succeeded { exit_code },
            (None, false, None) => TaskResult::Failed {
                step: "task".to_string(),
                message: SchedulerError::TaskNeverRan.to_string(),
            },
        };

        TaskOutcome {
            result,
            cleanup_warnings: state.cleanup_warnings,
            phases: state.phases,
            events: state.log,
        }
    }

    fn task_exited(&self, state: &RunState) -> bool {
        state
            .log
            .snapshot()
            .exit_code_of(self.graph.task_container_name())
            .is_some()
    }

    fn begin_cleanup(&mut self, state: &mut RunState) {
        let phase = if state.first_failure.is_some() {
            TaskPhase::CleaningUpAfterFailure
        } else if state.cancelled {
            TaskPhase::CleaningUpAfterCancellation
        } else {
            TaskPhase::AllCompleted
        };
        state.enter(phase);

        for rule in teardown_rules(&self.graph, state.log.snapshot()) {
            let key = rule.key();
            debug!("Adding teardown rule {}", rule);
            if self.rules.add(rule) {
                state.states.insert(key, RuleState::NotReady);
            }
        }
    }

    fn evaluate(&self, state: &mut RunState) {
        let forward_open =
            state.phase == TaskPhase::Running && !state.stopping() && !self.task_exited(state);
        let events = state.log.snapshot();

        let ready: Vec<(StepKey, TaskStep)> = self
            .rules
            .iter()
            .filter(|rule| forward_open || rule.is_teardown())
            .filter(|rule| state.states.get(&rule.key()) == Some(&RuleState::NotReady))
            .filter_map(|rule| match rule.evaluate(events) {
                RuleEvaluation::Ready(step) => Some((rule.key(), step)),
                RuleEvaluation::NotReady => None,
            })
            .collect();

        for (key, step) in ready {
            debug!("Step ready: {}", step);
            state.states.insert(key, RuleState::Ready);
            state.ready.push_back(step);
        }
    }

    fn dispatch(&self, state: &mut RunState, workers: &mut JoinSet<Vec<TaskEvent>>) {
        let limit = self.config.max_parallelism.max(1);

        while workers.len() < limit {
            let Some(step) = state.ready.pop_front() else {
                break;
            };

            state.states.insert(step.key(), RuleState::Executing);
            let runner = Arc::clone(&self.runner);
            let worker_step = step.clone();
            let handle = workers.spawn(async move { runner.run(&worker_step).await });
            state.in_flight.insert(handle.id(), step);
        }
    }

    fn complete(&self, state: &mut RunState, joined: Result<(Id, Vec<TaskEvent>), JoinError>) {
        let (id, events) = match joined {
            Ok((id, events)) => (id, events),
            Err(join_error) => {
                let id = join_error.id();
                let events = match state.in_flight.get(&id) {
                    Some(step) => vec![TaskEvent::StepFailed {
                        step: step.clone(),
                        message: format!("step did not complete: {}", join_error),
                    }],
                    None => Vec::new(),
                };
                (id, events)
            }
        };

        let Some(step) = state.in_flight.remove(&id) else {
            warn!("Completion for unknown worker {}", id);
            return;
        };

        let key = step.key();
        let failed = events.iter().any(|event| match event {
            TaskEvent::StepFailed { step, .. } => step.key() == key,
            _ => false,
        });

        for event in events {
            self.record(state, event);
        }

        state.states.insert(
            key,
            if failed {
                RuleState::Failed
            } else {
                RuleState::Completed
            },
        );
    }

    fn record(&self, state: &mut RunState, event: TaskEvent) {
        if let TaskEvent::StepFailed { step, message } = &event {
            if step.is_teardown() {
                state
                    .cleanup_warnings
                    .push(format!("{} failed: {}", step, message));
            } else if state.first_failure.is_none() {
                state.first_failure = Some((step.to_string(), message.clone()));
            }
        }

        match state.log.append(event.clone()) {
            Ok(()) => {
                if let Some(listener) = &self.listener {
                    let _ = listener.send(event);
                }
            }
            Err(e) => warn!("Dropping event {}: {}", event, e),
        }
    }
}

async fn cancellation_requested(receiver: &mut Option<watch::Receiver<bool>>) {
    let Some(receiver) = receiver else {
        return std::future::pending().await;
    };

    loop {
        if receiver.changed().await.is_err() {
            return std::future::pending().await;
        }
        if *receiver.borrow() {
            return;
        }
    }
}
