//! Rules that bring a task's containers up and run the task container.

use super::RuleEvaluation;
use crate::config::{Container, Dependency, Readiness};
use crate::execution::events::{EventQuery, TaskEvent};
use crate::execution::steps::{ContainerRole, StepAction, StepKey, TaskStep};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct BuildImageStepRule {
    pub container: Container,
    pub image_tag: String,
}

impl BuildImageStepRule {
    pub fn new(container: Container, image_tag: impl Into<String>) -> Self {
        Self {
            container,
            image_tag: image_tag.into(),
        }
    }

    pub fn key(&self) -> StepKey {
        StepKey::container(&self.container.name, StepAction::BuildImage)
    }

    pub fn evaluate(&self, _events: &[TaskEvent]) -> RuleEvaluation {
        RuleEvaluation::Ready(TaskStep::BuildImage {
            container: self.container.clone(),
            image_tag: self.image_tag.clone(),
        })
    }
}

impl fmt::Display for BuildImageStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BuildImageStepRule(container: '{}', image tag: '{}')",
            self.container.name, self.image_tag
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullImageStepRule {
    pub container: Container,
    pub image_name: String,
}

impl PullImageStepRule {
    pub fn new(container: Container, image_name: impl Into<String>) -> Self {
        Self {
            container,
            image_name: image_name.into(),
        }
    }

    pub fn key(&self) -> StepKey {
        StepKey::container(&self.container.name, StepAction::PullImage)
    }

    pub fn evaluate(&self, _events: &[TaskEvent]) -> RuleEvaluation {
        RuleEvaluation::Ready(TaskStep::PullImage {
            container: self.container.clone(),
            image_name: self.image_name.clone(),
        })
    }
}

impl fmt::Display for PullImageStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PullImageStepRule(container: '{}', image: '{}')",
            self.container.name, self.image_name
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTaskNetworkStepRule {
    pub network_name: String,
}

impl CreateTaskNetworkStepRule {
    pub fn new(network_name: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
        }
    }

    pub fn key(&self) -> StepKey {
        StepKey::network(StepAction::CreateNetwork)
    }

    pub fn evaluate(&self, _events: &[TaskEvent]) -> RuleEvaluation {
        RuleEvaluation::Ready(TaskStep::CreateTaskNetwork {
            network_name: self.network_name.clone(),
        })
    }
}

impl fmt::Display for CreateTaskNetworkStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CreateTaskNetworkStepRule(name: '{}')", self.network_name)
    }
}

/// Ready once the image and network exist and every dependency has reached
/// the readiness its edge asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateContainerStepRule {
    pub container: Container,
    pub role: ContainerRole,
    pub dependencies: Vec<Dependency>,
}

impl CreateContainerStepRule {
    pub fn new(container: Container, role: ContainerRole, dependencies: Vec<Dependency>) -> Self {
        Self {
            container,
            role,
            dependencies,
        }
    }

    pub fn key(&self) -> StepKey {
        StepKey::container(&self.container.name, StepAction::CreateContainer)
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        let Some(image) = events.image_for(&self.container.name) else {
            return RuleEvaluation::NotReady;
        };
        let Some(network) = events.network() else {
            return RuleEvaluation::NotReady;
        };

        let dependencies_ready = self
            .dependencies
            .iter()
            .all(|dependency| match dependency.wait_for {
                Readiness::Started => events.has_started(&dependency.container),
                Readiness::Healthy => events.has_become_healthy(&dependency.container),
            });
        if !dependencies_ready {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::CreateContainer {
            container: self.container.clone(),
            role: self.role,
            image: image.clone(),
            network: network.clone(),
        })
    }
}

impl fmt::Display for CreateContainerStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dependencies: Vec<&str> = self
            .dependencies
            .iter()
            .map(|d| d.container.as_str())
            .collect();
        write!(
            f,
            "CreateContainerStepRule(container: '{}', dependencies: [{}])",
            self.container.name,
            dependencies.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartContainerStepRule {
    pub container: String,
}

impl StartContainerStepRule {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }

    pub fn key(&self) -> StepKey {
        StepKey::container(&self.container, StepAction::StartContainer)
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        match events.docker_container_for(&self.container) {
            Some(docker_container) => RuleEvaluation::Ready(TaskStep::StartContainer {
                container: self.container.clone(),
                docker_container: docker_container.clone(),
            }),
            None => RuleEvaluation::NotReady,
        }
    }
}

impl fmt::Display for StartContainerStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StartContainerStepRule(container: '{}')", self.container)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitForContainerToBecomeHealthyStepRule {
    pub container: String,
}

impl WaitForContainerToBecomeHealthyStepRule {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }

    pub fn key(&self) -> StepKey {
        StepKey::container(&self.container, StepAction::WaitForHealthy)
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        if !events.has_started(&self.container) {
            return RuleEvaluation::NotReady;
        }

        match events.docker_container_for(&self.container) {
            Some(docker_container) => {
                RuleEvaluation::Ready(TaskStep::WaitForContainerToBecomeHealthy {
                    container: self.container.clone(),
                    docker_container: docker_container.clone(),
                })
            }
            None => RuleEvaluation::NotReady,
        }
    }
}

impl fmt::Display for WaitForContainerToBecomeHealthyStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WaitForContainerToBecomeHealthyStepRule(container: '{}')",
            self.container
        )
    }
}

/// Starts the task container and waits for it to exit.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContainerStepRule {
    pub container: String,
}

impl RunContainerStepRule {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }

    pub fn key(&self) -> StepKey {
        StepKey::container(&self.container, StepAction::RunContainer)
    }

    pub fn evaluate(&self, events: &[TaskEvent]) -> RuleEvaluation {
        match events.docker_container_for(&self.container) {
            Some(docker_container) => RuleEvaluation::Ready(TaskStep::RunContainer {
                container: self.container.clone(),
                docker_container: docker_container.clone(),
            }),
            None => RuleEvaluation::NotReady,
        }
    }
}

impl fmt::Display for RunContainerStepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunContainerStepRule(container: '{}')", self.container)
    }
}
