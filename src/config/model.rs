use crate::config::duration;
use crate::docker::UserAndGroup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level project configuration: the containers that can be started and
/// the tasks that run in them.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Used to name images and networks. Defaults to the project directory name.
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub containers: BTreeMap<String, Container>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
    /// Directory relative paths in the configuration are resolved against.
    #[serde(skip)]
    pub project_directory: PathBuf,
}

/// A task: one container run to completion, plus whatever it needs started first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub run: TaskRunConfig,
    /// Extra containers to start alongside the task container.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// What to run for a task and the task-specific overrides for that container.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskRunConfig {
    pub container: String,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

/// A configured container.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ContainerDefinition")]
pub struct Container {
    pub name: String,
    pub image_source: ImageSource,
    pub command: Vec<String>,
    pub entrypoint: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub working_directory: Option<String>,
    pub volumes: Vec<VolumeMountConfig>,
    pub devices: Vec<DeviceMount>,
    pub ports: Vec<PortMapping>,
    pub health_check: HealthCheckConfig,
    pub dependencies: Vec<Dependency>,
    pub additional_hostnames: Vec<String>,
    pub user: Option<UserAndGroup>,
    pub privileged: bool,
    pub enable_init_process: bool,
    pub capabilities_to_add: Vec<Capability>,
    pub capabilities_to_drop: Vec<Capability>,
}

impl Container {
    /// A container pulled from a registry with every other setting left at its default.
    pub fn new(name: impl Into<String>, image_source: ImageSource) -> Self {
        Self {
            name: name.into(),
            image_source,
            command: Vec::new(),
            entrypoint: Vec::new(),
            environment: BTreeMap::new(),
            working_directory: None,
            volumes: Vec::new(),
            devices: Vec::new(),
            ports: Vec::new(),
            health_check: HealthCheckConfig::default(),
            dependencies: Vec::new(),
            additional_hostnames: Vec::new(),
            user: None,
            privileged: false,
            enable_init_process: false,
            capabilities_to_add: Vec::new(),
            capabilities_to_drop: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, container: impl Into<String>, wait_for: Readiness) -> Self {
        self.dependencies.push(Dependency {
            container: container.into(),
            wait_for,
        });
        self
    }
}

/// Where a container's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Built from a local directory containing a Dockerfile.
    Build {
        build_directory: PathBuf,
        dockerfile: Option<String>,
        build_args: BTreeMap<String, String>,
    },
    /// Pulled from a registry.
    Pull { image_name: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContainerDefinition {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    build_directory: Option<PathBuf>,
    #[serde(default)]
    dockerfile: Option<String>,
    #[serde(default)]
    build_args: BTreeMap<String, String>,
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    entrypoint: Vec<String>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    volumes: Vec<VolumeMountConfig>,
    #[serde(default)]
    devices: Vec<DeviceMount>,
    #[serde(default)]
    ports: Vec<PortMapping>,
    #[serde(default)]
    health_check: HealthCheckConfig,
    #[serde(default)]
    dependencies: Vec<Dependency>,
    #[serde(default)]
    additional_hostnames: Vec<String>,
    #[serde(default)]
    user: Option<UserAndGroup>,
    #[serde(default)]
    privileged: bool,
    #[serde(default)]
    enable_init_process: bool,
    #[serde(default)]
    capabilities_to_add: Vec<Capability>,
    #[serde(default)]
    capabilities_to_drop: Vec<Capability>,
}

impl TryFrom<ContainerDefinition> for Container {
    type Error = String;

    fn try_from(definition: ContainerDefinition) -> Result<Self, Self::Error> {
        let image_source = match (definition.image, definition.build_directory) {
            (Some(image_name), None) => ImageSource::Pull { image_name },
            (None, Some(build_directory)) => ImageSource::Build {
                build_directory,
                dockerfile: definition.dockerfile,
                build_args: definition.build_args,
            },
            (Some(_), Some(_)) => {
                return Err("only one of 'image' or 'build_directory' can be set".to_string());
            }
            (None, None) => {
                return Err("one of 'image' or 'build_directory' must be set".to_string());
            }
        };

        Ok(Self {
            name: String::new(),
            image_source,
            command: definition.command,
            entrypoint: definition.entrypoint,
            environment: definition.environment,
            working_directory: definition.working_directory,
            volumes: definition.volumes,
            devices: definition.devices,
            ports: definition.ports,
            health_check: definition.health_check,
            dependencies: definition.dependencies,
            additional_hostnames: definition.additional_hostnames,
            user: definition.user,
            privileged: definition.privileged,
            enable_init_process: definition.enable_init_process,
            capabilities_to_add: definition.capabilities_to_add,
            capabilities_to_drop: definition.capabilities_to_drop,
        })
    }
}

/// The event a dependent container waits for before it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// The dependency has been started.
    Started,
    /// The dependency has reported healthy (or has no health check).
    #[default]
    Healthy,
}

/// A "depends on" edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "DependencyDefinition")]
pub struct Dependency {
    pub container: String,
    pub wait_for: Readiness,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyDefinition {
    Name(String),
    Detailed {
        container: String,
        #[serde(default)]
        wait_for: Readiness,
    },
}

impl From<DependencyDefinition> for Dependency {
    fn from(definition: DependencyDefinition) -> Self {
        match definition {
            DependencyDefinition::Name(container) => Self {
                container,
                wait_for: Readiness::default(),
            },
            DependencyDefinition::Detailed {
                container,
                wait_for,
            } => Self {
                container,
                wait_for,
            },
        }
    }
}

/// Health check settings. Every field is optional; unset values fall back to
/// the zero values the Docker API treats as "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default, with = "duration::option")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default, with = "duration::option")]
    pub start_period: Option<Duration>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Publishes a container port on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub local: u16,
    pub container: u16,
}

impl PortMapping {
    pub fn new(local: u16, container: u16) -> Self {
        Self { local, container }
    }
}

/// Exposes a host device inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceMount {
    pub local: String,
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

impl DeviceMount {
    pub fn new(
        local: impl Into<String>,
        container: impl Into<String>,
        options: Option<&str>,
    ) -> Self {
        Self {
            local: local.into(),
            container: container.into(),
            options: options.map(String::from),
        }
    }
}

/// A volume mount as written in configuration. Exactly one of `local` (a host
/// path) or `name` (a Docker volume) is expected; which one is resolved when
/// the container creation request is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
pub struct VolumeMountConfig {
    #[serde(default)]
    pub local: Option<PathBuf>,
    #[serde(default)]
    pub name: Option<String>,
    pub container: String,
    #[serde(default)]
    pub options: Option<String>,
}

impl VolumeMountConfig {
    pub fn local(local: impl Into<PathBuf>, container: impl Into<String>, options: Option<&str>) -> Self {
        Self {
            local: Some(local.into()),
            name: None,
            container: container.into(),
            options: options.map(String::from),
        }
    }

    pub fn named(name: impl Into<String>, container: impl Into<String>, options: Option<&str>) -> Self {
        Self {
            local: None,
            name: Some(name.into()),
            container: container.into(),
            options: options.map(String::from),
        }
    }
}

/// Linux capabilities that can be added to or dropped from a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    AuditControl,
    AuditRead,
    AuditWrite,
    BlockSuspend,
    Chown,
    DacOverride,
    DacReadSearch,
    Fowner,
    Fsetid,
    IpcLock,
    IpcOwner,
    Kill,
    Lease,
    LinuxImmutable,
    MacAdmin,
    MacOverride,
    Mknod,
    NetAdmin,
    NetBindService,
    NetBroadcast,
    NetRaw,
    Setfcap,
    Setgid,
    Setpcap,
    Setuid,
    SysAdmin,
    SysBoot,
    SysChroot,
    SysModule,
    SysNice,
    SysPacct,
    SysPtrace,
    SysRawio,
    SysResource,
    SysTime,
    SysTtyConfig,
    Syslog,
    WakeAlarm,
    All,
}

impl Capability {
    /// Name as understood by the Docker API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::AuditControl => "AUDIT_CONTROL",
            Capability::AuditRead => "AUDIT_READ",
            Capability::AuditWrite => "AUDIT_WRITE",
            Capability::BlockSuspend => "BLOCK_SUSPEND",
            Capability::Chown => "CHOWN",
            Capability::DacOverride => "DAC_OVERRIDE",
            Capability::DacReadSearch => "DAC_READ_SEARCH",
            Capability::Fowner => "FOWNER",
            Capability::Fsetid => "FSETID",
            Capability::IpcLock => "IPC_LOCK",
            Capability::IpcOwner => "IPC_OWNER",
            Capability::Kill => "KILL",
            Capability::Lease => "LEASE",
            Capability::LinuxImmutable => "LINUX_IMMUTABLE",
            Capability::MacAdmin => "MAC_ADMIN",
            Capability::MacOverride => "MAC_OVERRIDE",
            Capability::Mknod => "MKNOD",
            Capability::NetAdmin => "NET_ADMIN",
            Capability::NetBindService => "NET_BIND_SERVICE",
            Capability::NetBroadcast => "NET_BROADCAST",
            Capability::NetRaw => "NET_RAW",
            Capability::Setfcap => "SETFCAP",
            Capability::Setgid => "SETGID",
            Capability::Setpcap => "SETPCAP",
            Capability::Setuid => "SETUID",
            Capability::SysAdmin => "SYS_ADMIN",
            Capability::SysBoot => "SYS_BOOT",
            Capability::SysChroot => "SYS_CHROOT",
            Capability::SysModule => "SYS_MODULE",
            Capability::SysNice => "SYS_NICE",
            Capability::SysPacct => "SYS_PACCT",
            Capability::SysPtrace => "SYS_PTRACE",
            Capability::SysRawio => "SYS_RAWIO",
            Capability::SysResource => "SYS_RESOURCE",
            Capability::SysTime => "SYS_TIME",
            Capability::SysTtyConfig => "SYS_TTY_CONFIG",
            Capability::Syslog => "SYSLOG",
            Capability::WakeAlarm => "WAKE_ALARM",
            Capability::All => "ALL",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
