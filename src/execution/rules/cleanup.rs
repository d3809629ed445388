//! Rules that tear a task run down again.
//!
//! Teardown is planned once, from what the event log says was actually
//! brought up. Containers are torn down dependents-first, and the task network
//! goes last. A failed teardown step counts as resolved so the rest of the
//! teardown still runs.

use super::{RuleEvaluation, TaskStepRule};
use crate::docker::{DockerContainer, DockerNetwork};
use crate::execution::events::{EventQuery, TaskEvent};
use crate::execution::graph::TaskGraph;
use crate::execution::steps::{StepAction, StepKey, TaskStep};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

fn all_resolved(after: &[StepKey], events: &[TaskEvent]) -> bool {
    after.iter().all(|key| events.is_resolved(key))
}

fn describe(keys: &[StepKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopContainerStepRule {
    pub container: String,
    pub docker_container: DockerContainer,
    pub after: Vec<StepKey>,
}

impl StopContainerStepRule {
    pub fn key(&self) -> StepKey {
        StepKey::container(&self.container, StepAction::StopContainer)
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        if !all_resolved(&self.after, events) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::StopContainer {
            container: self.container.clone(),
            docker_container: self.docker_container.clone(),
        })
    }
}

impl fmt::Display for StopContainerStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StopContainerStepRule(container: '{}', after: [{}])",
            self.container,
            describe(&self.after)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveContainerStepRule {
    pub container: String,
    pub docker_container: DockerContainer,
    pub after: Vec<StepKey>,
}

impl RemoveContainerStepRule {
    pub fn key(&self) -> StepKey {
        StepKey::container(&self.container, StepAction::RemoveContainer)
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        if !all_resolved(&self.after, events) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::RemoveContainer {
            container: self.container.clone(),
            docker_container: self.docker_container.clone(),
        })
    }
}

impl fmt::Display for RemoveContainerStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RemoveContainerStepRule(container: '{}', after: [{}])",
            self.container,
            describe(&self.after)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteTaskNetworkStepRule {
    pub network: DockerNetwork,
    pub after: Vec<StepKey>,
}

impl DeleteTaskNetworkStepRule {
    pub fn key(&self) -> StepKey {
        StepKey::network(StepAction::DeleteNetwork)
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        if !all_resolved(&self.after, events) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::DeleteTaskNetwork {
            network: self.network.clone(),
        })
    }
}

impl fmt::Display for DeleteTaskNetworkStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeleteTaskNetworkStepRule(network: '{}', after: [{}])",
            self.network.id,
            describe(&self.after)
        )
    }
}

/// Ready once every other teardown step has resolved and at least one that
/// left something behind has failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportCleanupFailureStepRule {
    pub after: Vec<StepKey>,
    pub manual_cleanup_commands: Vec<(StepKey, String)>,
}

impl ReportCleanupFailureStepRule {
    pub fn key(&self) -> StepKey {
        StepKey::task(StepAction::ReportCleanupFailure)
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        if !all_resolved(&self.after, events) {
            return RuleEvaluation::NotReady;
        }

        let manual_cleanup_commands: Vec<String> = self
            .manual_cleanup_commands
            .iter()
            .filter(|(key, _)| events.has_failed(key))
            .map(|(_, command)| command.clone())
            .collect();
        if manual_cleanup_commands.is_empty() {
            return RuleEvaluation::NotReady;
        }

        let reason = events
            .failures()
            .into_iter()
            .filter(|(step, _)| self.after.contains(&step.key()))
            .map(|(step, message)| format!("{} failed: {}", step, message))
            .collect::<Vec<_>>()
            .join("; ");

        RuleEvaluation::Ready(TaskStep::CleanupFailed {
            reason,
            manual_cleanup_commands,
        })
    }
}

impl fmt::Display for ReportCleanupFailureStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReportCleanupFailureStepRule(after: [{}])",
            describe(&self.after)
        )
    }
}

pub fn remove_container_command(docker_container: &DockerContainer) -> String {
    format!(
        "docker rm --force {}",
        shell_escape::escape(Cow::from(docker_container.name.as_str()))
    )
}

pub fn delete_network_command(network: &DockerNetwork) -> String {
    format!(
        "docker network rm {}",
        shell_escape::escape(Cow::from(network.id.as_str()))
    )
}

/// Plan the teardown of everything the event log says exists.
///
/// A container's first teardown action is a stop if it is still running,
/// otherwise a removal if it was ever created. Containers never created get
/// no teardown at all.
pub fn teardown_rules(graph: &TaskGraph, events: &[TaskEvent]) -> Vec<TaskStepRule> {
    let mut first_actions: HashMap<&str, StepKey> = HashMap::new();
    let mut created: Vec<(&str, &DockerContainer, bool)> = Vec::new();

    for name in graph.nodes() {
        let Some(docker_container) = events.docker_container_for(name) else {
            continue;
        };

        let running = events.has_started(name) && events.exit_code_of(name).is_none();
        let first = if running {
            StepKey::container(name, StepAction::StopContainer)
        } else {
            StepKey::container(name, StepAction::RemoveContainer)
        };
        first_actions.insert(name.as_str(), first);
        created.push((name.as_str(), docker_container, running));
    }

    let dependents_first = |name: &str| -> Vec<StepKey> {
        graph
            .dependents_of(name)
            .iter()
            .filter_map(|dependent| first_actions.get(dependent.as_str()).cloned())
            .collect()
    };

    let mut rules = Vec::new();
    let mut teardown_keys = Vec::new();
    let mut manual_cleanup_commands = Vec::new();
    let mut removals = Vec::new();

    for (name, docker_container, running) in created {
        let remove_after = if running {
            let stop = StopContainerStepRule {
                container: name.to_string(),
                docker_container: docker_container.clone(),
                after: dependents_first(name),
            };
            teardown_keys.push(stop.key());
            let stop_key = stop.key();
            rules.push(TaskStepRule::StopContainer(stop));
            vec![stop_key]
        } else {
            dependents_first(name)
        };

        let remove = RemoveContainerStepRule {
            container: name.to_string(),
            docker_container: docker_container.clone(),
            after: remove_after,
        };
        teardown_keys.push(remove.key());
        removals.push(remove.key());
        manual_cleanup_commands.push((remove.key(), remove_container_command(docker_container)));
        rules.push(TaskStepRule::RemoveContainer(remove));
    }

    if let Some(network) = events.network() {
        let delete = DeleteTaskNetworkStepRule {
            network: network.clone(),
            after: removals,
        };
        teardown_keys.push(delete.key());
        manual_cleanup_commands.push((delete.key(), delete_network_command(network)));
        rules.push(TaskStepRule::DeleteTaskNetwork(delete));
    }

    if !teardown_keys.is_empty() {
        rules.push(TaskStepRule::ReportCleanupFailure(
            ReportCleanupFailureStepRule {
                after: teardown_keys,
                manual_cleanup_commands,
            },
        ));
    }

    rules
}
