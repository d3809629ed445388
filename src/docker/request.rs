//! The container creation request sent to `POST /containers/create`.
//!
//! [`DockerContainerCreationRequest::to_json`] produces the exact payload the
//! Docker API expects. Presence rules matter here: `Cmd` and `Entrypoint` are
//! left out rather than sent empty, while `Healthcheck` is always sent because
//! an all-zero health check is how "no health check" is expressed.
//!
//! The `Serialize` impl on the request is a separate, human readable form used
//! only for debug logging.

use crate::config::{Capability, DeviceMount, HealthCheckConfig, PortMapping};
use crate::docker::{DockerImage, DockerNetwork, UserAndGroup};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Cgroup permissions used when a device mount does not specify any.
pub const DEFAULT_DEVICE_PERMISSIONS: &str = "rwm";

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerContainerCreationRequest {
    pub name: String,
    pub image: DockerImage,
    pub network: DockerNetwork,
    pub command: Vec<String>,
    pub entrypoint: Vec<String>,
    pub hostname: String,
    pub network_aliases: Vec<String>,
    pub environment_variables: BTreeMap<String, String>,
    pub working_directory: Option<String>,
    pub volume_mounts: Vec<DockerVolumeMount>,
    pub device_mounts: Vec<DeviceMount>,
    pub port_mappings: Vec<PortMapping>,
    pub health_check_config: HealthCheckConfig,
    pub user_and_group: Option<UserAndGroup>,
    pub privileged: bool,
    pub init: bool,
    pub capabilities_to_add: Vec<Capability>,
    pub capabilities_to_drop: Vec<Capability>,
    #[serde(rename = "useTTY")]
    pub use_tty: bool,
    pub attach_stdin: bool,
}

/// A resolved volume mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerVolumeMount {
    pub source: DockerVolumeMountSource,
    pub container_path: String,
    pub options: Option<String>,
}

impl DockerVolumeMount {
    pub fn new(
        source: DockerVolumeMountSource,
        container_path: impl Into<String>,
        options: Option<&str>,
    ) -> Self {
        Self {
            source,
            container_path: container_path.into(),
            options: options.map(String::from),
        }
    }

    /// `<source>:<containerPath>[:<options>]`, the `Binds` entry format.
    pub fn to_bind(&self) -> String {
        match &self.options {
            Some(options) if !options.is_empty() => {
                format!("{}:{}:{}", self.source.formatted(), self.container_path, options)
            }
            _ => format!("{}:{}", self.source.formatted(), self.container_path),
        }
    }
}

/// What a volume mount points at on the host side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DockerVolumeMountSource {
    /// An absolute path on the host
    LocalPath(PathBuf),
    /// A named Docker volume
    Volume(String),
}

impl DockerVolumeMountSource {
    pub fn formatted(&self) -> String {
        match self {
            DockerVolumeMountSource::LocalPath(path) => path.display().to_string(),
            DockerVolumeMountSource::Volume(name) => name.clone(),
        }
    }
}

impl Serialize for DockerVolumeMountSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;

        match self {
            DockerVolumeMountSource::LocalPath(path) => {
                map.serialize_entry("type", "local_path")?;
                map.serialize_entry("formatted", &self.formatted())?;
                map.serialize_entry("path", &path.display().to_string())?;
            }
            DockerVolumeMountSource::Volume(name) => {
                map.serialize_entry("type", "volume")?;
                map.serialize_entry("formatted", &self.formatted())?;
                map.serialize_entry("name", name)?;
            }
        }

        map.end()
    }
}

fn port_key(port: u16) -> String {
    format!("{}/tcp", port)
}

fn nanos(duration: Option<Duration>) -> i64 {
    duration
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

impl DockerContainerCreationRequest {
    /// The request body in the format expected by the Docker API.
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();

        body.insert("AttachStdin".into(), json!(self.attach_stdin));
        body.insert("AttachStdout".into(), json!(true));
        body.insert("AttachStderr".into(), json!(true));
        body.insert("Tty".into(), json!(self.use_tty));
        body.insert("OpenStdin".into(), json!(false));
        body.insert("StdinOnce".into(), json!(false));
        body.insert("Image".into(), json!(self.image.id));

        // Docker treats an empty array differently from an absent key here.
        if !self.command.is_empty() {
            body.insert("Cmd".into(), json!(self.command));
        }

        if !self.entrypoint.is_empty() {
            body.insert("Entrypoint".into(), json!(self.entrypoint));
        }

        body.insert("Hostname".into(), json!(self.hostname));

        if let Some(working_directory) = &self.working_directory {
            body.insert("WorkingDir".into(), json!(working_directory));
        }

        if let Some(user_and_group) = &self.user_and_group {
            body.insert("User".into(), json!(user_and_group.to_string()));
        }

        body.insert("Env".into(), json!(self.env()));
        body.insert("ExposedPorts".into(), self.exposed_ports());
        body.insert("HostConfig".into(), self.host_config());
        body.insert("Healthcheck".into(), self.healthcheck());
        let mut endpoints = Map::new();
        endpoints.insert(
            self.network.id.clone(),
            json!({ "Aliases": self.network_aliases }),
        );
        body.insert(
            "NetworkingConfig".into(),
            json!({ "EndpointsConfig": Value::Object(endpoints) }),
        );

        Value::Object(body)
    }

    fn env(&self) -> Vec<String> {
        self.environment_variables
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }

    fn exposed_ports(&self) -> Value {
        let ports: Map<String, Value> = self
            .port_mappings
            .iter()
            .map(|mapping| (port_key(mapping.container), json!({})))
            .collect();

        Value::Object(ports)
    }

    fn host_config(&self) -> Value {
        let binds: Vec<String> = self.volume_mounts.iter().map(DockerVolumeMount::to_bind).collect();

        let devices: Vec<Value> = self
            .device_mounts
            .iter()
            .map(|device| {
                json!({
                    "PathOnHost": device.local,
                    "PathInContainer": device.container,
                    "CgroupPermissions": device.options.as_deref().unwrap_or(DEFAULT_DEVICE_PERMISSIONS),
                })
            })
            .collect();

        let port_bindings: Map<String, Value> = self
            .port_mappings
            .iter()
            .map(|mapping| {
                (
                    port_key(mapping.container),
                    json!([{ "HostIp": "", "HostPort": mapping.local.to_string() }]),
                )
            })
            .collect();

        let cap_add: Vec<&str> = self.capabilities_to_add.iter().map(Capability::as_str).collect();
        let cap_drop: Vec<&str> = self.capabilities_to_drop.iter().map(Capability::as_str).collect();

        json!({
            "NetworkMode": self.network.id,
            "Binds": binds,
            "Devices": devices,
            "PortBindings": Value::Object(port_bindings),
            "Privileged": self.privileged,
            "Init": self.init,
            "CapAdd": cap_add,
            "CapDrop": cap_drop,
        })
    }

    fn healthcheck(&self) -> Value {
        let config = &self.health_check_config;

        let test: Vec<String> = match &config.command {
            Some(command) => vec!["CMD-SHELL".to_string(), command.clone()],
            None => Vec::new(),
        };

        json!({
            "Test": test,
            "Interval": nanos(config.interval),
            "Retries": config.retries.unwrap_or(0),
            "StartPeriod": nanos(config.start_period),
        })
    }
}
