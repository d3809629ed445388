use crate::config::Container;
use crate::docker::{DockerContainer, DockerImage, DockerNetwork};
use std::fmt;

/// Something a step acts on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    /// A configured container, by name
    Container(String),
    /// The network shared by all containers of the task run
    TaskNetwork,
    /// The task run as a whole
    Task,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Container(name) => write!(f, "container '{}'", name),
            Entity::TaskNetwork => write!(f, "task network"),
            Entity::Task => write!(f, "task"),
        }
    }
}

/// Lifecycle actions, one rule per (entity, action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepAction {
    BuildImage,
    PullImage,
    CreateNetwork,
    CreateContainer,
    StartContainer,
    RunContainer,
    WaitForHealthy,
    StopContainer,
    RemoveContainer,
    DeleteNetwork,
    ReportCleanupFailure,
}

impl StepAction {
    /// Whether this action belongs to the teardown half of a run.
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            StepAction::StopContainer
                | StepAction::RemoveContainer
                | StepAction::DeleteNetwork
                | StepAction::ReportCleanupFailure
        )
    }
}

/// Identity of a rule and of the step it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepKey {
    pub entity: Entity,
    pub action: StepAction,
}

impl StepKey {
    pub fn new(entity: Entity, action: StepAction) -> Self {
        Self { entity, action }
    }

    pub fn container(name: impl Into<String>, action: StepAction) -> Self {
        Self::new(Entity::Container(name.into()), action)
    }

    pub fn network(action: StepAction) -> Self {
        Self::new(Entity::TaskNetwork, action)
    }

    pub fn task(action: StepAction) -> Self {
        Self::new(Entity::Task, action)
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.action, self.entity)
    }
}

/// Whether a container is the one the task runs, or one it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerRole {
    Task,
    Dependency,
}

/// One unit of work against the container runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStep {
    BuildImage {
        container: Container,
        image_tag: String,
    },
    PullImage {
        container: Container,
        image_name: String,
    },
    CreateTaskNetwork {
        network_name: String,
    },
    /// The creation request is built from these when the step executes.
    CreateContainer {
        container: Container,
        role: ContainerRole,
        image: DockerImage,
        network: DockerNetwork,
    },
    StartContainer {
        container: String,
        docker_container: DockerContainer,
    },
    RunContainer {
        container: String,
        docker_container: DockerContainer,
    },
    WaitForContainerToBecomeHealthy {
        container: String,
        docker_container: DockerContainer,
    },
    StopContainer {
        container: String,
        docker_container: DockerContainer,
    },
    RemoveContainer {
        container: String,
        docker_container: DockerContainer,
    },
    DeleteTaskNetwork {
        network: DockerNetwork,
    },
    CleanupFailed {
        reason: String,
        manual_cleanup_commands: Vec<String>,
    },
}

impl TaskStep {
    pub fn key(&self) -> StepKey {
        match self {
            TaskStep::BuildImage { container, .. } => {
                StepKey::container(&container.name, StepAction::BuildImage)
            }
            TaskStep::PullImage { container, .. } => {
                StepKey::container(&container.name, StepAction::PullImage)
            }
            TaskStep::CreateTaskNetwork { .. } => StepKey::network(StepAction::CreateNetwork),
            TaskStep::CreateContainer { container, .. } => {
                StepKey::container(&container.name, StepAction::CreateContainer)
            }
            TaskStep::StartContainer { container, .. } => {
                StepKey::container(container, StepAction::StartContainer)
            }
            TaskStep::RunContainer { container, .. } => {
                StepKey::container(container, StepAction::RunContainer)
            }
            TaskStep::WaitForContainerToBecomeHealthy { container, .. } => {
                StepKey::container(container, StepAction::WaitForHealthy)
            }
            TaskStep::StopContainer { container, .. } => {
                StepKey::container(container, StepAction::StopContainer)
            }
            TaskStep::RemoveContainer { container, .. } => {
                StepKey::container(container, StepAction::RemoveContainer)
            }
            TaskStep::DeleteTaskNetwork { .. } => StepKey::network(StepAction::DeleteNetwork),
            TaskStep::CleanupFailed { .. } => StepKey::task(StepAction::ReportCleanupFailure),
        }
    }

    pub fn is_teardown(&self) -> bool {
        self.key().action.is_teardown()
    }
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStep::BuildImage {
                container,
                image_tag,
            } => write!(
                f,
                "BuildImage(container: '{}', image tag: '{}')",
                container.name, image_tag
            ),
            TaskStep::PullImage {
                container,
                image_name,
            } => write!(
                f,
                "PullImage(container: '{}', image: '{}')",
                container.name, image_name
            ),
            TaskStep::CreateTaskNetwork { network_name } => {
                write!(f, "CreateTaskNetwork(name: '{}')", network_name)
            }
            TaskStep::CreateContainer {
                container,
                image,
                network,
                ..
            } => write!(
                f,
                "CreateContainer(container: '{}', image: '{}', network: '{}')",
                container.name, image.id, network.id
            ),
            TaskStep::StartContainer {
                container,
                docker_container,
            } => write!(
                f,
                "StartContainer(container: '{}', id: '{}')",
                container, docker_container.id
            ),
            TaskStep::RunContainer {
                container,
                docker_container,
            } => write!(
                f,
                "RunContainer(container: '{}', id: '{}')",
                container, docker_container.id
            ),
            TaskStep::WaitForContainerToBecomeHealthy {
                container,
                docker_container,
            } => write!(
                f,
                "WaitForContainerToBecomeHealthy(container: '{}', id: '{}')",
                container, docker_container.id
            ),
            TaskStep::StopContainer {
                container,
                docker_container,
            } => write!(
                f,
                "StopContainer(container: '{}', id: '{}')",
                container, docker_container.id
            ),
            TaskStep::RemoveContainer {
                container,
                docker_container,
            } => write!(
                f,
                "RemoveContainer(container: '{}', id: '{}')",
                container, docker_container.id
            ),
            TaskStep::DeleteTaskNetwork { network } => {
                write!(f, "DeleteTaskNetwork(id: '{}')", network.id)
            }
            TaskStep::CleanupFailed { reason, .. } => write!(f, "CleanupFailed({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageSource;

    fn container(name: &str) -> Container {
        Container::new(
            name,
            ImageSource::Pull {
                image_name: "alpine:3.20".to_string(),
            },
        )
    }

    #[test]
    fn test_step_keys() {
        let step = TaskStep::BuildImage {
            container: container("app"),
            image_tag: "shop-app:latest".to_string(),
        };
        assert_eq!(step.key(), StepKey::container("app", StepAction::BuildImage));
        assert!(!step.is_teardown());

        let step = TaskStep::RemoveContainer {
            container: "app".to_string(),
            docker_container: DockerContainer::new("abc123", "shop-app-1"),
        };
        assert_eq!(
            step.key(),
            StepKey::container("app", StepAction::RemoveContainer)
        );
        assert!(step.is_teardown());

        let step = TaskStep::DeleteTaskNetwork {
            network: DockerNetwork::new("net-1"),
        };
        assert_eq!(step.key(), StepKey::network(StepAction::DeleteNetwork));
    }

    #[test]
    fn test_structural_equality() {
        let first = TaskStep::StartContainer {
            container: "db".to_string(),
            docker_container: DockerContainer::new("id-1", "shop-db-1"),
        };
        let second = TaskStep::StartContainer {
            container: "db".to_string(),
            docker_container: DockerContainer::new("id-1", "shop-db-1"),
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_display() {
        let step = TaskStep::BuildImage {
            container: container("the-container"),
            image_tag: "the-image-tag".to_string(),
        };
        assert_eq!(
            step.to_string(),
            "BuildImage(container: 'the-container', image tag: 'the-image-tag')"
        );
    }
}
