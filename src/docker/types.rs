use serde::{Deserialize, Serialize};
use std::fmt;

/// An image known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DockerImage {
    pub id: String,
}

impl DockerImage {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A network created for a task run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DockerNetwork {
    pub id: String,
}

impl DockerNetwork {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DockerContainer {
    pub id: String,
    pub name: String,
}

impl DockerContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DockerContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Numeric identity a container runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAndGroup {
    #[serde(alias = "uid", alias = "user_id")]
    pub user_id: u32,
    #[serde(alias = "gid", alias = "group_id")]
    pub group_id: u32,
}

impl UserAndGroup {
    pub fn new(user_id: u32, group_id: u32) -> Self {
        Self { user_id, group_id }
    }
}

impl fmt::Display for UserAndGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.group_id)
    }
}

/// Final health state reported while waiting for a container to become healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The container has no health check configured
    NoHealthCheck,
    /// The health check passed
    Healthy,
    /// The health check failed more times than allowed
    Unhealthy,
    /// The container stopped before reporting healthy
    Exited,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::NoHealthCheck => write!(f, "no health check"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Exited => write!(f, "exited"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_and_group_formats_as_uid_gid() {
        assert_eq!(UserAndGroup::new(789, 222).to_string(), "789:222");
    }

    #[test]
    fn test_user_and_group_accepts_short_names() {
        let user: UserAndGroup = toml::from_str("uid = 1000\ngid = 100\n").unwrap();
        assert_eq!(user, UserAndGroup::new(1000, 100));
    }
}
