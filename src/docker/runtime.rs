use crate::docker::{
    DockerContainer, DockerContainerCreationRequest, DockerImage, DockerNetwork, HealthStatus,
    Result,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Parameters for building an image from a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildRequest {
    pub build_directory: PathBuf,
    pub dockerfile: Option<String>,
    pub build_args: BTreeMap<String, String>,
    pub tag: String,
}

/// Operations the scheduler needs from a container runtime.
///
/// Every call surfaces failure as a [`DockerError`](crate::docker::DockerError);
/// timeouts (health checks, stops) are the implementation's responsibility and
/// are reported the same way.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn build_image(&self, request: &ImageBuildRequest) -> Result<DockerImage>;

    async fn pull_image(&self, image_name: &str) -> Result<DockerImage>;

    async fn create_network(&self, name: &str) -> Result<DockerNetwork>;

    async fn create_container(
        &self,
        request: &DockerContainerCreationRequest,
    ) -> Result<DockerContainer>;

    async fn start_container(&self, container: &DockerContainer) -> Result<()>;

    /// Block until the container exits, forwarding its output, and return the exit code.
    async fn wait_for_exit(&self, container: &DockerContainer) -> Result<i64>;

    /// Poll the container's health until it settles on a final status.
    async fn wait_for_health_status(&self, container: &DockerContainer) -> Result<HealthStatus>;

    async fn stop_container(&self, container: &DockerContainer) -> Result<()>;

    async fn remove_container(&self, container: &DockerContainer) -> Result<()>;

    async fn delete_network(&self, network: &DockerNetwork) -> Result<()>;
}
