use crate::config::ImageSource;
use crate::docker::{ContainerRuntime, HealthStatus, ImageBuildRequest};
use crate::execution::events::TaskEvent;
use crate::execution::request_factory::ContainerCreationRequestFactory;
use crate::execution::steps::TaskStep;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executes steps against a container runtime and reports what happened.
///
/// Running a step never fails outright: every error is turned into a
/// `StepFailed` event for that step.
pub struct StepRunner {
    runtime: Arc<dyn ContainerRuntime>,
    factory: ContainerCreationRequestFactory,
}

impl StepRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, factory: ContainerCreationRequestFactory) -> Self {
        Self { runtime, factory }
    }

    pub async fn run(&self, step: &TaskStep) -> Vec<TaskEvent> {
        debug!("Running step: {}", step);
        let mut events = Vec::new();

        if let Err(message) = self.execute(step, &mut events).await {
            warn!("Step {} failed: {}", step, message);
            events.push(TaskEvent::StepFailed {
                step: step.clone(),
                message,
            });
        }

        events
    }

    async fn execute(&self, step: &TaskStep, events: &mut Vec<TaskEvent>) -> Result<(), String> {
        let runtime = &self.runtime;

        match step {
            TaskStep::BuildImage {
                container,
                image_tag,
            } => {
                let ImageSource::Build {
                    build_directory,
                    dockerfile,
                    build_args,
                } = &container.image_source
                else {
                    return Err(format!("container '{}' has no build directory", container.name));
                };

                info!("Building image {} for {}", image_tag, container.name);
                let request = ImageBuildRequest {
                    build_directory: self.factory.resolve_path(build_directory),
                    dockerfile: dockerfile.clone(),
                    build_args: build_args.clone(),
                    tag: image_tag.clone(),
                };
                let image = runtime
                    .build_image(&request)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::ImageBuilt {
                    container: container.name.clone(),
                    image,
                });
            }
            TaskStep::PullImage {
                container,
                image_name,
            } => {
                info!("Pulling image {} for {}", image_name, container.name);
                let image = runtime
                    .pull_image(image_name)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::ImagePulled {
                    container: container.name.clone(),
                    image,
                });
            }
            TaskStep::CreateTaskNetwork { network_name } => {
                let network = runtime
                    .create_network(network_name)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::TaskNetworkCreated { network });
            }
            TaskStep::CreateContainer {
                container,
                role,
                image,
                network,
            } => {
                let request = self
                    .factory
                    .create(container, *role, image, network)
                    .map_err(|e| e.to_string())?;
                let docker_container = runtime
                    .create_container(&request)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::ContainerCreated {
                    container: container.name.clone(),
                    docker_container,
                });
            }
            TaskStep::StartContainer {
                container,
                docker_container,
            } => {
                runtime
                    .start_container(docker_container)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::ContainerStarted {
                    container: container.clone(),
                });
            }
            TaskStep::RunContainer {
                container,
                docker_container,
            } => {
                runtime
                    .start_container(docker_container)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::ContainerStarted {
                    container: container.clone(),
                });

                let exit_code = runtime
                    .wait_for_exit(docker_container)
                    .await
                    .map_err(|e| e.to_string())?;
                info!("Container {} exited with code {}", container, exit_code);
                events.push(TaskEvent::ContainerExited {
                    container: container.clone(),
                    exit_code,
                });
            }
            TaskStep::WaitForContainerToBecomeHealthy {
                container,
                docker_container,
            } => {
                let status = runtime
                    .wait_for_health_status(docker_container)
                    .await
                    .map_err(|e| e.to_string())?;

                match status {
                    HealthStatus::NoHealthCheck | HealthStatus::Healthy => {
                        events.push(TaskEvent::ContainerBecameHealthy {
                            container: container.clone(),
                        });
                    }
                    HealthStatus::Unhealthy => {
                        return Err(format!(
                            "container '{}' did not become healthy",
                            container
                        ));
                    }
                    HealthStatus::Exited => {
                        return Err(format!(
                            "container '{}' exited before it became healthy",
                            container
                        ));
                    }
                }
            }
            TaskStep::StopContainer {
                container,
                docker_container,
            } => {
                runtime
                    .stop_container(docker_container)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::ContainerStopped {
                    container: container.clone(),
                });
            }
            TaskStep::RemoveContainer {
                container,
                docker_container,
            } => {
                runtime
                    .remove_container(docker_container)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::ContainerRemoved {
                    container: container.clone(),
                });
            }
            TaskStep::DeleteTaskNetwork { network } => {
                runtime
                    .delete_network(network)
                    .await
                    .map_err(|e| e.to_string())?;
                events.push(TaskEvent::TaskNetworkDeleted);
            }
            TaskStep::CleanupFailed {
                reason,
                manual_cleanup_commands,
            } => {
                warn!("Clean up failed: {}", reason);
                warn!("Run these commands to remove what was left behind:");
                for command in manual_cleanup_commands {
                    warn!("    {}", command);
                }
            }
        }

        Ok(())
    }
}
