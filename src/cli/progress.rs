//! Human readable progress output for a task run.

use crate::execution::{TaskEvent, TaskStep};
use tokio::sync::mpsc;

/// One line of progress for an event, if it is worth showing.
pub fn describe(event: &TaskEvent) -> Option<String> {
    let line = match event {
        TaskEvent::ImageBuilt { container, .. } => format!("🔨 Built image for {}", container),
        TaskEvent::ImagePulled { container, .. } => format!("📥 Pulled image for {}", container),
        TaskEvent::TaskNetworkCreated { .. } => "🌐 Created task network".to_string(),
        TaskEvent::ContainerStarted { container } => format!("🚀 Started {}", container),
        TaskEvent::ContainerBecameHealthy { container } => {
            format!("💚 {} is ready", container)
        }
        TaskEvent::ContainerExited {
            container,
            exit_code,
        } => format!("🏁 {} exited with code {}", container, exit_code),
        TaskEvent::StepFailed { step, message } => match step {
            TaskStep::StopContainer { .. }
            | TaskStep::RemoveContainer { .. }
            | TaskStep::DeleteTaskNetwork { .. } => format!("⚠️  Clean up: {}: {}", step, message),
            _ => format!("❌ {}: {}", step, message),
        },
        TaskEvent::ContainerCreated { .. }
        | TaskEvent::ContainerStopped { .. }
        | TaskEvent::ContainerRemoved { .. }
        | TaskEvent::TaskNetworkDeleted => return None,
    };

    Some(line)
}

/// Print progress lines until the sender side is dropped.
pub async fn report(mut events: mpsc::UnboundedReceiver<TaskEvent>) {
    while let Some(event) = events.recv().await {
        if let Some(line) = describe(&event) {
            println!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::{DockerContainer, DockerNetwork};

    #[test]
    fn test_describe() {
        let line = describe(&TaskEvent::ContainerExited {
            container: "app".to_string(),
            exit_code: 2,
        });
        assert_eq!(line.as_deref(), Some("🏁 app exited with code 2"));

        assert!(describe(&TaskEvent::TaskNetworkDeleted).is_none());
    }

    #[test]
    fn test_teardown_failures_are_marked_as_clean_up() {
        let line = describe(&TaskEvent::StepFailed {
            step: TaskStep::RemoveContainer {
                container: "db".to_string(),
                docker_container: DockerContainer::new("id", "shop-db-1"),
            },
            message: "busy".to_string(),
        })
        .unwrap();
        assert!(line.starts_with("⚠️  Clean up"));

        let line = describe(&TaskEvent::StepFailed {
            step: TaskStep::DeleteTaskNetwork {
                network: DockerNetwork::new("net"),
            },
            message: "in use".to_string(),
        })
        .unwrap();
        assert!(line.contains("in use"));
    }
}
