//! Project configuration.
//!
//! A project is described by a TOML file listing containers and tasks:
//!
//! ```toml
//! project_name = "shop"
//!
//! [containers.database]
//! image = "postgres:16"
//! health_check = { interval = "1s", retries = 10, command = "pg_isready" }
//!
//! [containers.app]
//! build_directory = "images/app"
//! dependencies = ["database"]
//! volumes = [{ local = ".", container = "/code", options = "cached" }]
//!
//! [tasks.test]
//! description = "Run the test suite"
//! run = { container = "app", command = ["./gradlew", "test"] }
//! ```
//!
//! Loading checks syntax, per-field shape and that project and container
//! names can be used in Docker image tags and container names. Cross
//! references between containers are checked when the task graph is built.

mod discovery;
pub mod duration;
mod model;

pub use discovery::ConfigDiscovery;
pub use model::{
    Capability, Container, Dependency, DeviceMount, HealthCheckConfig, ImageSource,
    PortMapping, ProjectConfig, Readiness, TaskConfig, TaskRunConfig, VolumeMountConfig,
};

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Name used when the project directory gives nothing usable.
const DEFAULT_PROJECT_NAME: &str = "berth";

/// Lowercase components joined by single separators, as Docker requires for
/// image repositories.
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").expect("name pattern is valid")
    })
}

fn validate_name(kind: &'static str, name: &str) -> Result<(), ConfigError> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Turn a directory name into a usable project name.
fn project_name_from_directory(directory: &str) -> String {
    let mut name = String::with_capacity(directory.len());
    for c in directory.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_') {
            c
        } else {
            '-'
        };
        let separator = !c.is_ascii_alphanumeric();
        if separator && name.ends_with(|last: char| !last.is_ascii_alphanumeric()) {
            continue;
        }
        name.push(c);
    }

    let name = name.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    if name.is_empty() {
        DEFAULT_PROJECT_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Could not read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has the wrong shape
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// No configuration file was given and none was found
    #[error("No configuration file found (looked for {0})")]
    NotFound(String),

    /// The requested task is not defined
    #[error("Task '{0}' is not defined in the configuration")]
    UnknownTask(String),

    /// A project or container name cannot be used in Docker names
    #[error(
        "Invalid {kind} name '{name}': use lowercase letters and digits, separated by single '.', '_' or '-'"
    )]
    InvalidName { kind: &'static str, name: String },
}

impl ProjectConfig {
    /// Parse configuration from a TOML string. Relative paths are resolved
    /// against `project_directory`.
    pub fn from_toml_str(content: &str, project_directory: &Path) -> Result<Self, ConfigError> {
        let mut config: ProjectConfig = toml::from_str(content)?;
        config.project_directory = project_directory.to_path_buf();

        if config.project_name.is_empty() {
            config.project_name = project_directory
                .file_name()
                .map(|name| project_name_from_directory(&name.to_string_lossy()))
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());
        }
        validate_name("project", &config.project_name)?;

        for (name, container) in config.containers.iter_mut() {
            validate_name("container", name)?;
            container.name = name.clone();
        }

        for (name, task) in config.tasks.iter_mut() {
            task.name = name.clone();
        }

        debug!(
            "Loaded project '{}' with {} containers and {} tasks",
            config.project_name,
            config.containers.len(),
            config.tasks.len()
        );

        Ok(config)
    }

    /// Load configuration from a TOML file. The file's directory becomes the
    /// project directory.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let project_directory = path
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_toml_str(&content, &project_directory)
    }

    /// Look up a task by name.
    pub fn task(&self, name: &str) -> Result<&TaskConfig, ConfigError> {
        self.tasks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTask(name.to_string()))
    }
}
