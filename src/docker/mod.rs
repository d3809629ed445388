//! Container runtime boundary.
//!
//! This module holds everything that crosses over to the Docker (or Podman)
//! daemon: the value types for images, networks and containers, the container
//! creation request with its wire format, and the [`ContainerRuntime`] trait
//! the scheduler drives.
//!
//! - [`request`]: `DockerContainerCreationRequest` and its exact JSON payload
//! - [`runtime`]: the async `ContainerRuntime` trait
//! - [`client`]: a bollard-backed implementation (feature `docker`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use berth::docker::{ContainerRuntime, DockerClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DockerClient::new().await?;
//!     let network = client.create_network("example-network").await?;
//!     client.delete_network(&network).await?;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "docker")]
mod client;
pub mod request;
mod runtime;
mod types;

#[cfg(feature = "docker")]
pub use client::{DockerClient, DockerClientConfig, RuntimeType};
pub use request::{DockerContainerCreationRequest, DockerVolumeMount, DockerVolumeMountSource};
pub use runtime::{ContainerRuntime, ImageBuildRequest};
pub use types::{DockerContainer, DockerImage, DockerNetwork, HealthStatus, UserAndGroup};

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    /// Docker/Podman API error
    #[cfg(feature = "docker")]
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Request could not be converted for the API client
    #[error("Could not encode request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Image build failed
    #[error("Image build failed: {0}")]
    BuildFailed(String),

    /// Image pull failed
    #[error("Image pull failed: {0}")]
    PullFailed(String),

    /// Container did not settle on a health status in time
    #[error("Timed out after {seconds}s waiting for container {container} to become healthy")]
    HealthCheckTimeout { container: String, seconds: u64 },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

/// Result type for container runtime operations.
pub type Result<T> = std::result::Result<T, DockerError>;
