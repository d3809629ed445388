//! Docker/Podman client.
//!
//! Implements [`ContainerRuntime`] on top of the bollard Docker API, with
//! automatic connection fallback to Podman sockets. Image builds go through
//! the `docker` (or `podman`) CLI.

use crate::docker::{
    ContainerRuntime, DockerContainer, DockerContainerCreationRequest, DockerError, DockerImage,
    DockerNetwork, HealthStatus, ImageBuildRequest, Result,
};
use crate::env;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::HealthStatusEnum;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Docker client configuration.
#[derive(Debug, Clone)]
pub struct DockerClientConfig {
    /// Seconds to wait for a container to stop before it is killed
    pub stop_timeout: i64,
    /// How often to poll a container's health status
    pub health_poll_interval: Duration,
    /// Give up waiting for a health status after this long
    pub health_timeout: Duration,
    /// Project label attached to created networks
    pub project_name: Option<String>,
}

impl Default for DockerClientConfig {
    fn default() -> Self {
        Self {
            stop_timeout: 10,
            health_poll_interval: Duration::from_millis(500),
            health_timeout: Duration::from_secs(300),
            project_name: None,
        }
    }
}

/// Docker/Podman API client.
#[derive(Clone)]
pub struct DockerClient {
    docker: Arc<Docker>,
    config: DockerClientConfig,
}

impl DockerClient {
    /// Create a new client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if neither Docker nor Podman are available or connection fails.
    pub async fn new() -> Result<Self> {
        Self::with_config(DockerClientConfig::default()).await
    }

    /// Create a new client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns error if connection to the container runtime fails.
    pub async fn with_config(config: DockerClientConfig) -> Result<Self> {
        let docker = Self::connect()?;

        let client = Self {
            docker: Arc::new(docker),
            config,
        };

        client.ping().await?;

        Ok(client)
    }

    /// Tries local defaults (Unix socket, named pipe or `DOCKER_HOST`) first,
    /// then the rootless and system Podman sockets.
    fn connect() -> Result<Docker> {
        debug!("Attempting to connect to container runtime...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("Connected to container runtime via local defaults");
                return Ok(docker);
            }
            Err(e) => {
                debug!("Local defaults failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(home) = std::env::var("HOME") {
                sockets.push(format!("unix://{}/run/podman/podman.sock", home));
            }
            sockets.push("unix:///run/podman/podman.sock".to_string());

            for socket in sockets {
                debug!("Trying Podman socket: {}", socket);

                match Docker::connect_with_socket(&socket, 120, bollard::API_DEFAULT_VERSION) {
                    Ok(docker) => {
                        info!("Connected to Podman via {}", socket);
                        return Ok(docker);
                    }
                    Err(e) => {
                        debug!("Podman socket {} failed: {}", socket, e);
                    }
                }
            }
        }

        Err(DockerError::Other(
            "Failed to connect to Docker or Podman. Please ensure Docker or Podman is installed and running.".to_string()
        ))
    }

    /// Ping the container runtime to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns error if ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            DockerError::Other(format!("Failed to ping container runtime: {}", e))
        })?;
        debug!("Container runtime ping successful");
        Ok(())
    }

    /// The underlying bollard client, for inspecting resources directly.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Check if the runtime is Docker or Podman.
    ///
    /// # Errors
    ///
    /// Returns error if the version query fails.
    pub async fn runtime_type(&self) -> Result<RuntimeType> {
        let version = self.docker.version().await?;

        let is_podman = version
            .components
            .and_then(|comps| {
                comps
                    .iter()
                    .find(|c| c.name == "Engine")
                    .map(|c| c.version.clone())
            })
            .filter(|name| name.to_lowercase().contains("podman"))
            .is_some();

        Ok(if is_podman {
            RuntimeType::Podman
        } else {
            RuntimeType::Docker
        })
    }

    async fn image_id(&self, reference: &str) -> Result<DockerImage> {
        let inspect = self.docker.inspect_image(reference).await.map_err(|e| match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => DockerError::NotFound(reference.to_string()),
            e => DockerError::ApiError(e),
        })?;

        inspect
            .id
            .map(DockerImage::new)
            .ok_or_else(|| DockerError::Other(format!("Image {} has no ID", reference)))
    }

    fn cli_binary() -> Result<PathBuf> {
        which::which("docker")
            .or_else(|_| which::which("podman"))
            .map_err(|_| {
                DockerError::BuildFailed(
                    "neither 'docker' nor 'podman' was found on PATH".to_string(),
                )
            })
    }

    async fn forward_output(docker: Arc<Docker>, container_id: String) {
        let mut stream = docker.logs(
            &container_id,
            Some(bollard::container::LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(log) => {
                    print!("{}", log);
                    let _ = std::io::stdout().flush();
                }
                Err(e) => {
                    debug!("Output stream for {} ended: {}", container_id, e);
                    break;
                }
            }
        }
    }

    async fn poll_health(&self, container: &DockerContainer) -> Result<HealthStatus> {
        loop {
            let inspect = self
                .docker
                .inspect_container(
                    &container.id,
                    None::<bollard::query_parameters::InspectContainerOptions>,
                )
                .await
                .map_err(|e| match e {
                    bollard::errors::Error::DockerResponseServerError {
                        status_code: 404, ..
                    } => DockerError::NotFound(container.name.clone()),
                    e => DockerError::ApiError(e),
                })?;

            let state = inspect.state.ok_or_else(|| {
                DockerError::Other(format!("Container {} has no state", container.name))
            })?;

            if !state.running.unwrap_or(false) {
                return Ok(HealthStatus::Exited);
            }

            match state.health.and_then(|health| health.status) {
                None | Some(HealthStatusEnum::EMPTY) | Some(HealthStatusEnum::NONE) => {
                    return Ok(HealthStatus::NoHealthCheck);
                }
                Some(HealthStatusEnum::HEALTHY) => return Ok(HealthStatus::Healthy),
                Some(HealthStatusEnum::UNHEALTHY) => return Ok(HealthStatus::Unhealthy),
                Some(HealthStatusEnum::STARTING) => {
                    debug!("Container {} is still starting", container.name);
                }
            }

            tokio::time::sleep(self.config.health_poll_interval).await;
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn build_image(&self, request: &ImageBuildRequest) -> Result<DockerImage> {
        info!("Building image {} from {:?}", request.tag, request.build_directory);

        let mut command = tokio::process::Command::new(Self::cli_binary()?);
        command.arg("build").arg("--tag").arg(&request.tag);

        if let Some(dockerfile) = &request.dockerfile {
            command
                .arg("--file")
                .arg(request.build_directory.join(dockerfile));
        }

        for (key, value) in &request.build_args {
            command.arg("--build-arg").arg(format!("{}={}", key, value));
        }

        let output = command.arg(&request.build_directory).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::BuildFailed(stderr.trim().to_string()));
        }

        let image = self.image_id(&request.tag).await?;
        info!("Built image {} ({})", request.tag, image.id);
        Ok(image)
    }

    async fn pull_image(&self, image_name: &str) -> Result<DockerImage> {
        if let Ok(image) = self.image_id(image_name).await {
            debug!("Image {} already exists locally", image_name);
            return Ok(image);
        }

        info!("Pulling image: {}", image_name);

        let mut stream = self.docker.create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: image_name,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                debug!("Pull: {}", status);
            }
            if let Some(error) = info.error {
                return Err(DockerError::PullFailed(error));
            }
        }

        self.image_id(image_name).await
    }

    async fn create_network(&self, name: &str) -> Result<DockerNetwork> {
        debug!("Creating network: {}", name);

        let mut labels = HashMap::new();
        if let Some(project) = &self.config.project_name {
            labels.insert(env::labels::PROJECT, project.as_str());
        }

        let response = self
            .docker
            .create_network(bollard::network::CreateNetworkOptions {
                name,
                driver: "bridge",
                labels,
                ..Default::default()
            })
            .await?;

        info!("Created network: {} ({})", name, response.id);
        Ok(DockerNetwork::new(response.id))
    }

    async fn create_container(
        &self,
        request: &DockerContainerCreationRequest,
    ) -> Result<DockerContainer> {
        debug!(
            "Creating container with request: {}",
            serde_json::to_string(request)?
        );

        let body: bollard::container::Config<String> = serde_json::from_value(request.to_json())?;

        let response = self
            .docker
            .create_container(
                Some(bollard::container::CreateContainerOptions {
                    name: request.name.as_str(),
                    ..Default::default()
                }),
                body,
            )
            .await?;

        for warning in &response.warnings {
            warn!("Docker warning creating {}: {}", request.name, warning);
        }

        info!("Created container: {} ({})", request.name, response.id);
        Ok(DockerContainer::new(response.id, request.name.clone()))
    }

    async fn start_container(&self, container: &DockerContainer) -> Result<()> {
        debug!("Starting container: {}", container);

        self.docker
            .start_container(
                &container.id,
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await?;

        info!("Started container: {}", container);
        Ok(())
    }

    async fn wait_for_exit(&self, container: &DockerContainer) -> Result<i64> {
        let output = tokio::spawn(Self::forward_output(
            Arc::clone(&self.docker),
            container.id.clone(),
        ));

        let mut stream = self.docker.wait_container(
            &container.id,
            None::<bollard::container::WaitContainerOptions<String>>,
        );

        let exit_code = match stream.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(DockerError::ApiError(e)),
            None => {
                return Err(DockerError::Other(format!(
                    "Wait stream for {} ended without a status",
                    container
                )));
            }
        };

        let _ = output.await;

        info!("Container {} exited with code {}", container, exit_code);
        Ok(exit_code)
    }

    async fn wait_for_health_status(&self, container: &DockerContainer) -> Result<HealthStatus> {
        let timeout = self.config.health_timeout;

        match tokio::time::timeout(timeout, self.poll_health(container)).await {
            Ok(status) => status,
            Err(_) => Err(DockerError::HealthCheckTimeout {
                container: container.name.clone(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn stop_container(&self, container: &DockerContainer) -> Result<()> {
        debug!("Stopping container: {}", container);

        match self
            .docker
            .stop_container(
                &container.id,
                Some(bollard::container::StopContainerOptions {
                    t: self.config.stop_timeout,
                }),
            )
            .await
        {
            Ok(()) => {}
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!("Container {} was already stopped", container);
            }
            Err(e) => return Err(DockerError::ApiError(e)),
        }

        info!("Stopped container: {}", container);
        Ok(())
    }

    async fn remove_container(&self, container: &DockerContainer) -> Result<()> {
        debug!("Removing container: {}", container);

        self.docker
            .remove_container(
                &container.id,
                Some(bollard::container::RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;

        info!("Removed container: {}", container);
        Ok(())
    }

    async fn delete_network(&self, network: &DockerNetwork) -> Result<()> {
        debug!("Removing network: {}", network.id);
        self.docker.remove_network(&network.id).await?;
        info!("Removed network: {}", network.id);
        Ok(())
    }
}

/// Type of container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "Docker"),
            RuntimeType::Podman => write!(f, "Podman"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DockerClientConfig::default();
        assert_eq!(config.stop_timeout, 10);
        assert!(config.health_poll_interval < config.health_timeout);
    }

    #[test]
    fn test_runtime_type_display() {
        assert_eq!(RuntimeType::Docker.to_string(), "Docker");
        assert_eq!(RuntimeType::Podman.to_string(), "Podman");
    }

    #[tokio::test]
    #[ignore] // Requires Docker/Podman to be running
    async fn test_client_connection() {
        let client = DockerClient::new().await.unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_runtime_detection() {
        let client = DockerClient::new().await.unwrap();
        let runtime_type = client.runtime_type().await.unwrap();
        println!("Runtime type: {}", runtime_type);
    }
}
