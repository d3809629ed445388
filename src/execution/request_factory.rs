use crate::config::{Container, DeviceMount, PortMapping, TaskRunConfig, VolumeMountConfig};
use crate::docker::{
    DockerContainerCreationRequest, DockerImage, DockerNetwork, DockerVolumeMount,
    DockerVolumeMountSource,
};
use crate::env;
use crate::execution::steps::ContainerRole;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error(
        "Volume mount '{container_path}' of container '{container}' must set exactly one of 'local' or 'name'"
    )]
    UnresolvableVolumeSource {
        container: String,
        container_path: String,
    },

    #[error("Device mount '{container_path}' of container '{container}' has no local path")]
    UnresolvableDevicePath {
        container: String,
        container_path: String,
    },
}

/// Turns configured containers into creation requests for one task run.
#[derive(Debug, Clone)]
pub struct ContainerCreationRequestFactory {
    project_directory: PathBuf,
    project_name: String,
    run_id: String,
    task_run: TaskRunConfig,
    use_tty: bool,
    attach_stdin: bool,
}

impl ContainerCreationRequestFactory {
    pub fn new(
        project_directory: impl Into<PathBuf>,
        project_name: impl Into<String>,
        run_id: impl Into<String>,
        task_run: TaskRunConfig,
    ) -> Self {
        Self {
            project_directory: project_directory.into(),
            project_name: project_name.into(),
            run_id: run_id.into(),
            task_run,
            use_tty: false,
            attach_stdin: false,
        }
    }

    /// Attach a terminal to the task container.
    pub fn with_terminal(mut self, use_tty: bool, attach_stdin: bool) -> Self {
        self.use_tty = use_tty;
        self.attach_stdin = attach_stdin;
        self
    }

    /// Resolve a configured path against the project directory. `.` and `..`
    /// are folded lexically; the path does not have to exist.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_directory.join(path)
        };

        let mut resolved = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if resolved.file_name().is_some() {
                        resolved.pop();
                    } else if !resolved.has_root() {
                        resolved.push(component);
                    }
                }
                other => resolved.push(other),
            }
        }
        resolved
    }

    pub fn create(
        &self,
        container: &Container,
        role: ContainerRole,
        image: &DockerImage,
        network: &DockerNetwork,
    ) -> Result<DockerContainerCreationRequest, BuilderError> {
        let name = env::container_name(&self.project_name, &container.name, &self.run_id);

        let volume_mounts = container
            .volumes
            .iter()
            .map(|volume| self.resolve_volume(container, volume))
            .collect::<Result<Vec<_>, _>>()?;

        for device in &container.devices {
            check_device(container, device)?;
        }

        let mut network_aliases = vec![container.name.clone()];
        for hostname in &container.additional_hostnames {
            if !network_aliases.contains(hostname) {
                network_aliases.push(hostname.clone());
            }
        }

        let mut request = DockerContainerCreationRequest {
            name: name.clone(),
            image: image.clone(),
            network: network.clone(),
            command: container.command.clone(),
            entrypoint: container.entrypoint.clone(),
            hostname: container.name.clone(),
            network_aliases,
            environment_variables: container.environment.clone(),
            working_directory: container.working_directory.clone(),
            volume_mounts,
            device_mounts: container.devices.clone(),
            port_mappings: container.ports.clone(),
            health_check_config: container.health_check.clone(),
            user_and_group: container.user,
            privileged: container.privileged,
            init: container.enable_init_process,
            capabilities_to_add: dedup(&container.capabilities_to_add),
            capabilities_to_drop: dedup(&container.capabilities_to_drop),
            use_tty: false,
            attach_stdin: false,
        };

        if role == ContainerRole::Task {
            self.apply_task_overrides(&mut request);
        }

        debug!(
            "Container creation request for {}: {}",
            container.name,
            serde_json::to_string(&request).unwrap_or_default()
        );

        Ok(request)
    }

    fn apply_task_overrides(&self, request: &mut DockerContainerCreationRequest) {
        let task_run = &self.task_run;

        if let Some(command) = &task_run.command {
            request.command = command.clone();
        }
        if let Some(entrypoint) = &task_run.entrypoint {
            request.entrypoint = entrypoint.clone();
        }
        if task_run.working_directory.is_some() {
            request.working_directory = task_run.working_directory.clone();
        }

        request.environment_variables.extend(
            task_run
                .environment
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        for port in &task_run.ports {
            if !request.port_mappings.contains(port) {
                request.port_mappings.push(PortMapping::new(port.local, port.container));
            }
        }

        request.use_tty = self.use_tty;
        request.attach_stdin = self.attach_stdin;
    }

    fn resolve_volume(
        &self,
        container: &Container,
        volume: &VolumeMountConfig,
    ) -> Result<DockerVolumeMount, BuilderError> {
        let source = match (&volume.local, &volume.name) {
            (Some(local), None) => DockerVolumeMountSource::LocalPath(self.resolve_path(local)),
            (None, Some(name)) if !name.is_empty() => DockerVolumeMountSource::Volume(name.clone()),
            _ => {
                return Err(BuilderError::UnresolvableVolumeSource {
                    container: container.name.clone(),
                    container_path: volume.container.clone(),
                });
            }
        };

        Ok(DockerVolumeMount::new(
            source,
            volume.container.clone(),
            volume.options.as_deref(),
        ))
    }
}

fn check_device(container: &Container, device: &DeviceMount) -> Result<(), BuilderError> {
    if device.local.trim().is_empty() {
        return Err(BuilderError::UnresolvableDevicePath {
            container: container.name.clone(),
            container_path: device.container.clone(),
        });
    }

    Ok(())
}

fn dedup<T: Clone + PartialEq>(items: &[T]) -> Vec<T> {
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(item) {
            unique.push(item.clone());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Capability, ImageSource};
    use crate::docker::UserAndGroup;

    fn factory(task_run: TaskRunConfig) -> ContainerCreationRequestFactory {
        ContainerCreationRequestFactory::new("/home/user/shop", "shop", "run1", task_run)
    }

    fn container() -> Container {
        let mut container = Container::new(
            "api",
            ImageSource::Pull {
                image_name: "nginx:1.27".to_string(),
            },
        );
        container.command = vec!["nginx".to_string(), "-g".to_string()];
        container.environment.insert("MODE".to_string(), "dev".to_string());
        container.environment.insert("LOG".to_string(), "info".to_string());
        container.additional_hostnames = vec!["api.local".to_string(), "api".to_string()];
        container.ports = vec![PortMapping::new(8080, 80)];
        container.user = Some(UserAndGroup::new(1000, 1000));
        container.capabilities_to_add = vec![Capability::NetAdmin, Capability::NetAdmin];
        container
    }

    fn image() -> DockerImage {
        DockerImage::new("sha256:api")
    }

    fn network() -> DockerNetwork {
        DockerNetwork::new("net-1")
    }

    #[test]
    fn test_dependency_request() {
        let request = factory(TaskRunConfig::default())
            .create(&container(), ContainerRole::Dependency, &image(), &network())
            .unwrap();

        assert_eq!(request.name, "shop-api-run1");
        assert_eq!(request.hostname, "api");
        assert_eq!(request.network_aliases, vec!["api", "api.local"]);
        assert_eq!(request.command, vec!["nginx", "-g"]);
        assert_eq!(request.environment_variables.len(), 2);
        assert_eq!(request.capabilities_to_add, vec![Capability::NetAdmin]);
        assert_eq!(request.user_and_group, Some(UserAndGroup::new(1000, 1000)));
        assert!(!request.use_tty);
    }

    #[test]
    fn test_task_overrides_only_apply_to_task_container() {
        let mut task_run = TaskRunConfig {
            container: "api".to_string(),
            command: Some(vec!["sh".to_string()]),
            working_directory: Some("/src".to_string()),
            ports: vec![PortMapping::new(9090, 90), PortMapping::new(8080, 80)],
            ..Default::default()
        };
        task_run.environment.insert("MODE".to_string(), "test".to_string());
        let factory = factory(task_run).with_terminal(true, true);

        let request = factory
            .create(&container(), ContainerRole::Task, &image(), &network())
            .unwrap();
        assert_eq!(request.command, vec!["sh"]);
        assert_eq!(request.working_directory.as_deref(), Some("/src"));
        assert_eq!(request.environment_variables["MODE"], "test");
        assert_eq!(request.environment_variables["LOG"], "info");
        assert_eq!(
            request.port_mappings,
            vec![PortMapping::new(8080, 80), PortMapping::new(9090, 90)]
        );
        assert!(request.use_tty);
        assert!(request.attach_stdin);

        let request = factory
            .create(&container(), ContainerRole::Dependency, &image(), &network())
            .unwrap();
        assert_eq!(request.command, vec!["nginx", "-g"]);
        assert_eq!(request.environment_variables["MODE"], "dev");
        assert!(!request.use_tty);
    }

    #[test]
    fn test_volume_sources() {
        let mut container = container();
        container.volumes = vec![
            VolumeMountConfig::local("./src", "/code", Some("cached")),
            VolumeMountConfig::local("/var/data", "/data", None),
            VolumeMountConfig::named("cache", "/cache", None),
        ];

        let request = factory(TaskRunConfig::default())
            .create(&container, ContainerRole::Dependency, &image(), &network())
            .unwrap();
        let binds: Vec<String> = request
            .volume_mounts
            .iter()
            .map(DockerVolumeMount::to_bind)
            .collect();

        assert_eq!(
            binds,
            vec![
                "/home/user/shop/src:/code:cached",
                "/var/data:/data",
                "cache:/cache",
            ]
        );
    }

    #[test]
    fn test_resolved_paths_are_normalised() {
        let factory = factory(TaskRunConfig::default());

        assert_eq!(
            factory.resolve_path(Path::new(".")),
            PathBuf::from("/home/user/shop")
        );
        assert_eq!(
            factory.resolve_path(Path::new("../shared/./cache")),
            PathBuf::from("/home/user/shared/cache")
        );
        assert_eq!(
            factory.resolve_path(Path::new("/var/./data/../logs")),
            PathBuf::from("/var/logs")
        );
        assert_eq!(
            factory.resolve_path(Path::new("/../../etc")),
            PathBuf::from("/etc")
        );
    }

    #[test]
    fn test_volume_with_both_sources_is_rejected() {
        let mut container = container();
        let mut volume = VolumeMountConfig::named("cache", "/cache", None);
        volume.local = Some(PathBuf::from("./cache"));
        container.volumes = vec![volume];

        let error = factory(TaskRunConfig::default())
            .create(&container, ContainerRole::Dependency, &image(), &network())
            .unwrap_err();
        assert_eq!(
            error,
            BuilderError::UnresolvableVolumeSource {
                container: "api".to_string(),
                container_path: "/cache".to_string(),
            }
        );
    }

    #[test]
    fn test_device_without_local_path_is_rejected() {
        let mut container = container();
        container.devices = vec![DeviceMount::new("", "/dev/fuse", None)];

        let error = factory(TaskRunConfig::default())
            .create(&container, ContainerRole::Dependency, &image(), &network())
            .unwrap_err();
        assert!(matches!(error, BuilderError::UnresolvableDevicePath { .. }));
    }
}
