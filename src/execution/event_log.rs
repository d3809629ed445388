use crate::execution::events::TaskEvent;
use crate::execution::steps::StepKey;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventLogError {
    #[error("{key} has already been resolved")]
    AlreadyResolved { key: StepKey },
}

/// Append-only record of everything that happened during a task run.
///
/// Events are never edited or removed. Each (entity, action) pair may be
/// resolved at most once: a second completion or failure for the same pair
/// is rejected.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<TaskEvent>,
    recorded_at: Vec<DateTime<Utc>>,
    resolved: HashSet<StepKey>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: TaskEvent) -> Result<(), EventLogError> {
        if let Some(key) = event.resolves() {
            if !self.resolved.insert(key.clone()) {
                return Err(EventLogError::AlreadyResolved { key });
            }
        }

        debug!("Recorded event: {}", event);
        self.events.push(event);
        self.recorded_at.push(Utc::now());
        Ok(())
    }

    /// The events recorded so far, oldest first.
    pub fn snapshot(&self) -> &[TaskEvent] {
        &self.events
    }

    pub fn entries(&self) -> impl Iterator<Item = (DateTime<Utc>, &TaskEvent)> {
        self.recorded_at.iter().copied().zip(self.events.iter())
    }

    pub fn is_resolved(&self, key: &StepKey) -> bool {
        self.resolved.contains(key)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::DockerNetwork;
    use crate::execution::steps::{StepAction, TaskStep};

    #[test]
    fn test_append_preserves_order() {
        let mut log = EventLog::new();
        log.append(TaskEvent::TaskNetworkCreated {
            network: DockerNetwork::new("net"),
        })
        .unwrap();
        log.append(TaskEvent::ContainerStarted {
            container: "db".to_string(),
        })
        .unwrap();

        assert_eq!(log.len(), 2);
        assert!(matches!(
            log.snapshot()[0],
            TaskEvent::TaskNetworkCreated { .. }
        ));
        assert!(log.is_resolved(&StepKey::network(StepAction::CreateNetwork)));

        let timestamps: Vec<_> = log.entries().map(|(at, _)| at).collect();
        assert!(timestamps[0] <= timestamps[1]);
    }

    #[test]
    fn test_rejects_second_resolution() {
        let mut log = EventLog::new();
        log.append(TaskEvent::TaskNetworkCreated {
            network: DockerNetwork::new("net"),
        })
        .unwrap();

        let error = log
            .append(TaskEvent::StepFailed {
                step: TaskStep::CreateTaskNetwork {
                    network_name: "shop-1".to_string(),
                },
                message: "late failure".to_string(),
            })
            .unwrap_err();

        assert_eq!(
            error,
            EventLogError::AlreadyResolved {
                key: StepKey::network(StepAction::CreateNetwork)
            }
        );
        assert_eq!(log.len(), 1);
    }
}
