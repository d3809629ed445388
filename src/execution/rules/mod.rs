//! Step rules.
//!
//! A rule is a pure predicate over the event log: given the events so far it
//! either produces the concrete step to execute or reports that it is not
//! ready yet. Rules never perform side effects, and evaluating a rule against
//! a superset of events it was ready for yields the same step.

mod cleanup;
mod run;

pub use cleanup::{
    DeleteTaskNetworkStepRule, RemoveContainerStepRule, ReportCleanupFailureStepRule,
    StopContainerStepRule, delete_network_command, remove_container_command, teardown_rules,
};
pub use run::{
    BuildImageStepRule, CreateContainerStepRule, CreateTaskNetworkStepRule, PullImageStepRule,
    RunContainerStepRule, StartContainerStepRule, WaitForContainerToBecomeHealthyStepRule,
};

use crate::config::ImageSource;
use crate::env;
use crate::execution::events::TaskEvent;
use crate::execution::graph::TaskGraph;
use crate::execution::steps::{ContainerRole, StepKey, TaskStep};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleEvaluation {
    Ready(TaskStep),
    NotReady,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStepRule {
    BuildImage(BuildImageStepRule),
    PullImage(PullImageStepRule),
    CreateTaskNetwork(CreateTaskNetworkStepRule),
    CreateContainer(CreateContainerStepRule),
    StartContainer(StartContainerStepRule),
    WaitForContainerToBecomeHealthy(WaitForContainerToBecomeHealthyStepRule),
    RunContainer(RunContainerStepRule),
    StopContainer(StopContainerStepRule),
    RemoveContainer(RemoveContainerStepRule),
    DeleteTaskNetwork(DeleteTaskNetworkStepRule),
    ReportCleanupFailure(ReportCleanupFailureStepRule),
}

impl TaskStepRule {
    pub fn key(&self) -> StepKey {
        match self {
            TaskStepRule::BuildImage(rule) => rule.key(),
            TaskStepRule::PullImage(rule) => rule.key(),
            TaskStepRule::CreateTaskNetwork(rule) => rule.key(),
            TaskStepRule::CreateContainer(rule) => rule.key(),
            TaskStepRule::StartContainer(rule) => rule.key(),
            TaskStepRule::WaitForContainerToBecomeHealthy(rule) => rule.key(),
            TaskStepRule::RunContainer(rule) => rule.key(),
            TaskStepRule::StopContainer(rule) => rule.key(),
            TaskStepRule::RemoveContainer(rule) => rule.key(),
            TaskStepRule::DeleteTaskNetwork(rule) => rule.key(),
            TaskStepRule::ReportCleanupFailure(rule) => rule.key(),
        }
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        match self {
            TaskStepRule::BuildImage(rule) => rule.evaluate(events),
            TaskStepRule::PullImage(rule) => rule.evaluate(events),
            TaskStepRule::CreateTaskNetwork(rule) => rule.evaluate(events),
            TaskStepRule::CreateContainer(rule) => rule.evaluate(events),
            TaskStepRule::StartContainer(rule) => rule.evaluate(events),
            TaskStepRule::WaitForContainerToBecomeHealthy(rule) => rule.evaluate(events),
            TaskStepRule::RunContainer(rule) => rule.evaluate(events),
            TaskStepRule::StopContainer(rule) => rule.evaluate(events),
            TaskStepRule::RemoveContainer(rule) => rule.evaluate(events),
            TaskStepRule::DeleteTaskNetwork(rule) => rule.evaluate(events),
            TaskStepRule::ReportCleanupFailure(rule) => rule.evaluate(events),
        }
    }

    pub fn is_teardown(&self) -> bool {
        self.key().action.is_teardown()
    }
}

impl fmt::Display for TaskStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStepRule::BuildImage(rule) => rule.fmt(f),
            TaskStepRule::PullImage(rule) => rule.fmt(f),
            TaskStepRule::CreateTaskNetwork(rule) => rule.fmt(f),
            TaskStepRule::CreateContainer(rule) => rule.fmt(f),
            TaskStepRule::StartContainer(rule) => rule.fmt(f),
            TaskStepRule::WaitForContainerToBecomeHealthy(rule) => rule.fmt(f),
            TaskStepRule::RunContainer(rule) => rule.fmt(f),
            TaskStepRule::StopContainer(rule) => rule.fmt(f),
            TaskStepRule::RemoveContainer(rule) => rule.fmt(f),
            TaskStepRule::DeleteTaskNetwork(rule) => rule.fmt(f),
            TaskStepRule::ReportCleanupFailure(rule) => rule.fmt(f),
        }
    }
}

/// Rules keyed by the (entity, action) they produce, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<StepKey, TaskStepRule>,
    order: Vec<StepKey>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rules that bring up everything a task needs and run it.
    pub fn for_task(graph: &TaskGraph, project_name: &str, run_id: &str) -> Self {
        let mut rules = Self::new();

        rules.add(TaskStepRule::CreateTaskNetwork(CreateTaskNetworkStepRule::new(
            env::network_name(project_name, run_id),
        )));

        for name in graph.nodes() {
            let Some(container) = graph.container(name) else {
                continue;
            };

            rules.add(match &container.image_source {
                ImageSource::Build { .. } => TaskStepRule::BuildImage(BuildImageStepRule::new(
                    container.clone(),
                    env::image_tag(project_name, name),
                )),
                ImageSource::Pull { image_name } => TaskStepRule::PullImage(
                    PullImageStepRule::new(container.clone(), image_name.clone()),
                ),
            });

            let role = if graph.is_task_container(name) {
                ContainerRole::Task
            } else {
                ContainerRole::Dependency
            };
            rules.add(TaskStepRule::CreateContainer(CreateContainerStepRule::new(
                container.clone(),
                role,
                graph.dependencies_of(name).to_vec(),
            )));

            match role {
                ContainerRole::Task => {
                    rules.add(TaskStepRule::RunContainer(RunContainerStepRule::new(name)));
                }
                ContainerRole::Dependency => {
                    rules.add(TaskStepRule::StartContainer(StartContainerStepRule::new(
                        name,
                    )));
                    rules.add(TaskStepRule::WaitForContainerToBecomeHealthy(
                        WaitForContainerToBecomeHealthyStepRule::new(name),
                    ));
                }
            }
        }

        rules
    }

    /// Returns false if a rule with the same key is already present.
    pub fn add(&mut self, rule: TaskStepRule) -> bool {
        let key = rule.key();
        if self.rules.contains_key(&key) {
            return false;
        }

        self.order.push(key.clone());
        self.rules.insert(key, rule);
        true
    }

    pub fn get(&self, key: &StepKey) -> Option<&TaskStepRule> {
        self.rules.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskStepRule> {
        self.order.iter().filter_map(|key| self.rules.get(key))
    }

    pub fn keys(&self) -> &[StepKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests;
