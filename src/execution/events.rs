use crate::docker::{DockerContainer, DockerImage, DockerNetwork};
use crate::execution::steps::{StepAction, StepKey, TaskStep};
use std::fmt;

/// Outcome of a step, recorded in the event log.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    ImageBuilt {
        container: String,
        image: DockerImage,
    },
    ImagePulled {
        container: String,
        image: DockerImage,
    },
    TaskNetworkCreated {
        network: DockerNetwork,
    },
    ContainerCreated {
        container: String,
        docker_container: DockerContainer,
    },
    ContainerStarted {
        container: String,
    },
    ContainerBecameHealthy {
        container: String,
    },
    ContainerExited {
        container: String,
        exit_code: i64,
    },
    ContainerStopped {
        container: String,
    },
    ContainerRemoved {
        container: String,
    },
    TaskNetworkDeleted,
    StepFailed {
        step: TaskStep,
        message: String,
    },
}

impl TaskEvent {
    /// The (entity, action) pair this event terminally resolves.
    pub fn resolves(&self) -> Option<StepKey> {
        let key = match self {
            TaskEvent::ImageBuilt { container, .. } => {
                StepKey::container(container, StepAction::BuildImage)
            }
            TaskEvent::ImagePulled { container, .. } => {
                StepKey::container(container, StepAction::PullImage)
            }
            TaskEvent::TaskNetworkCreated { .. } => StepKey::network(StepAction::CreateNetwork),
            TaskEvent::ContainerCreated { container, .. } => {
                StepKey::container(container, StepAction::CreateContainer)
            }
            TaskEvent::ContainerStarted { container } => {
                StepKey::container(container, StepAction::StartContainer)
            }
            TaskEvent::ContainerBecameHealthy { container } => {
                StepKey::container(container, StepAction::WaitForHealthy)
            }
            TaskEvent::ContainerExited { container, .. } => {
                StepKey::container(container, StepAction::RunContainer)
            }
            TaskEvent::ContainerStopped { container } => {
                StepKey::container(container, StepAction::StopContainer)
            }
            TaskEvent::ContainerRemoved { container } => {
                StepKey::container(container, StepAction::RemoveContainer)
            }
            TaskEvent::TaskNetworkDeleted => StepKey::network(StepAction::DeleteNetwork),
            TaskEvent::StepFailed { step, .. } => step.key(),
        };

        Some(key)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskEvent::StepFailed { .. })
    }
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEvent::ImageBuilt { container, image } => {
                write!(f, "ImageBuilt(container: '{}', image: '{}')", container, image.id)
            }
            TaskEvent::ImagePulled { container, image } => {
                write!(f, "ImagePulled(container: '{}', image: '{}')", container, image.id)
            }
            TaskEvent::TaskNetworkCreated { network } => {
                write!(f, "TaskNetworkCreated(id: '{}')", network.id)
            }
            TaskEvent::ContainerCreated {
                container,
                docker_container,
            } => write!(
                f,
                "ContainerCreated(container: '{}', id: '{}')",
                container, docker_container.id
            ),
            TaskEvent::ContainerStarted { container } => {
                write!(f, "ContainerStarted(container: '{}')", container)
            }
            TaskEvent::ContainerBecameHealthy { container } => {
                write!(f, "ContainerBecameHealthy(container: '{}')", container)
            }
            TaskEvent::ContainerExited {
                container,
                exit_code,
            } => write!(
                f,
                "ContainerExited(container: '{}', exit code: {})",
                container, exit_code
            ),
            TaskEvent::ContainerStopped { container } => {
                write!(f, "ContainerStopped(container: '{}')", container)
            }
            TaskEvent::ContainerRemoved { container } => {
                write!(f, "ContainerRemoved(container: '{}')", container)
            }
            TaskEvent::TaskNetworkDeleted => write!(f, "TaskNetworkDeleted"),
            TaskEvent::StepFailed { step, message } => {
                write!(f, "StepFailed(step: {}, message: '{}')", step, message)
            }
        }
    }
}

/// Read-only queries over a snapshot of the event log.
pub trait EventQuery {
    fn image_for(&self, container: &str) -> Option<&DockerImage>;
    fn network(&self) -> Option<&DockerNetwork>;
    fn docker_container_for(&self, container: &str) -> Option<&DockerContainer>;
    fn has_started(&self, container: &str) -> bool;
    fn has_become_healthy(&self, container: &str) -> bool;
    fn exit_code_of(&self, container: &str) -> Option<i64>;
    fn is_resolved(&self, key: &StepKey) -> bool;
    fn has_failed(&self, key: &StepKey) -> bool;
    fn failures(&self) -> Vec<(&TaskStep, &str)>;
}

impl EventQuery for [TaskEvent] {
    fn image_for(&self, container: &str) -> Option<&DockerImage> {
        self.iter().find_map(|event| match event {
            TaskEvent::ImageBuilt { container: c, image }
            | TaskEvent::ImagePulled { container: c, image }
                if c == container =>
            {
                Some(image)
            }
            _ => None,
        })
    }

    fn network(&self) -> Option<&DockerNetwork> {
        self.iter().find_map(|event| match event {
            TaskEvent::TaskNetworkCreated { network } => Some(network),
            _ => None,
        })
    }

    fn docker_container_for(&self, container: &str) -> Option<&DockerContainer> {
        self.iter().find_map(|event| match event {
            TaskEvent::ContainerCreated {
                container: c,
                docker_container,
            } if c == container => Some(docker_container),
            _ => None,
        })
    }

    fn has_started(&self, container: &str) -> bool {
        self.iter().any(|event| {
            matches!(event, TaskEvent::ContainerStarted { container: c } if c == container)
        })
    }

    fn has_become_healthy(&self, container: &str) -> bool {
        self.iter().any(|event| {
            matches!(event, TaskEvent::ContainerBecameHealthy { container: c } if c == container)
        })
    }

    fn exit_code_of(&self, container: &str) -> Option<i64> {
        self.iter().find_map(|event| match event {
            TaskEvent::ContainerExited {
                container: c,
                exit_code,
            } if c == container => Some(*exit_code),
            _ => None,
        })
    }

    fn is_resolved(&self, key: &StepKey) -> bool {
        self.iter()
            .any(|event| event.resolves().as_ref() == Some(key))
    }

    fn has_failed(&self, key: &StepKey) -> bool {
        self.iter()
            .any(|event| event.is_failure() && event.resolves().as_ref() == Some(key))
    }

    fn failures(&self) -> Vec<(&TaskStep, &str)> {
        self.iter()
            .filter_map(|event| match event {
                TaskEvent::StepFailed { step, message } => Some((step, message.as_str())),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_resolves_the_failed_steps_key() {
        let step = TaskStep::CreateTaskNetwork {
            network_name: "shop-1".to_string(),
        };
        let event = TaskEvent::StepFailed {
            step,
            message: "boom".to_string(),
        };

        assert_eq!(
            event.resolves(),
            Some(StepKey::network(StepAction::CreateNetwork))
        );
        assert!(event.is_failure());
    }

    #[test]
    fn test_queries() {
        let events = vec![
            TaskEvent::TaskNetworkCreated {
                network: DockerNetwork::new("net"),
            },
            TaskEvent::ImagePulled {
                container: "db".to_string(),
                image: DockerImage::new("sha256:db"),
            },
            TaskEvent::ContainerCreated {
                container: "db".to_string(),
                docker_container: DockerContainer::new("c-db", "shop-db-1"),
            },
            TaskEvent::ContainerStarted {
                container: "db".to_string(),
            },
        ];
        let events = events.as_slice();

        assert_eq!(events.network(), Some(&DockerNetwork::new("net")));
        assert_eq!(events.image_for("db"), Some(&DockerImage::new("sha256:db")));
        assert_eq!(events.image_for("app"), None);
        assert_eq!(events.docker_container_for("db").map(|c| c.id.as_str()), Some("c-db"));
        assert!(events.has_started("db"));
        assert!(!events.has_become_healthy("db"));
        assert!(events.is_resolved(&StepKey::container("db", StepAction::StartContainer)));
        assert!(!events.has_failed(&StepKey::container("db", StepAction::StartContainer)));
        assert!(events.failures().is_empty());
    }
}
