//! Environment constants and path utilities.
//!
//! Centralizes the file names, label keys and naming conventions used when
//! talking to the container runtime.

use std::path::{Path, PathBuf};

/// Hidden per-project directory name
pub const BERTH_DIR_NAME: &str = ".berth";

/// Top-level configuration file name
pub const CONFIG_FILE_NAME: &str = "berth.toml";

/// Configuration file name inside the hidden directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "config.toml";

/// Docker labels attached to the task networks berth creates
pub mod labels {
    /// Project the network belongs to
    pub const PROJECT: &str = "dev.berth.project";
}

/// Build the `.berth/config.toml` path for a project directory
pub fn local_config_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(BERTH_DIR_NAME).join(LOCAL_CONFIG_FILE_NAME)
}

/// Tag for an image built for a container of a project
pub fn image_tag(project_name: &str, container_name: &str) -> String {
    format!("{}-{}:latest", project_name, container_name)
}

/// Docker container name for a container in a task run
pub fn container_name(project_name: &str, container_name: &str, run_id: &str) -> String {
    format!("{}-{}-{}", project_name, container_name, run_id)
}

/// Docker network name for a task run
pub fn network_name(project_name: &str, run_id: &str) -> String {
    format!("{}-{}", project_name, run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config_path() {
        assert_eq!(
            local_config_file_path(Path::new("/work/shop")),
            PathBuf::from("/work/shop/.berth/config.toml")
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(image_tag("shop", "app"), "shop-app:latest");
        assert_eq!(container_name("shop", "app", "1a2b"), "shop-app-1a2b");
        assert_eq!(network_name("shop", "1a2b"), "shop-1a2b");
    }
}
