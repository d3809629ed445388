//! Configuration file discovery.
//!
//! Candidates, in priority order:
//! 1. `./berth.toml`
//! 2. `./.berth/config.toml`
//!
//! A file passed explicitly on the command line always wins.

use crate::config::{ConfigError, ProjectConfig};
use crate::env;
use std::env as std_env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load the explicit file if given, otherwise the first candidate that exists.
    pub fn load(explicit: Option<&Path>) -> Result<ProjectConfig, ConfigError> {
        if let Some(path) = explicit {
            info!("Loading configuration from: {:?}", path);
            return ProjectConfig::from_toml_file(path);
        }

        match Self::find_config_file() {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                ProjectConfig::from_toml_file(path)
            }
            None => {
                let looked_in = Self::get_config_candidates()
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(ConfigError::NotFound(looked_in))
            }
        }
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        let current_dir = std_env::current_dir().ok()?;
        Self::find_config_file_in(&current_dir)
    }

    /// Find configuration file starting from a given directory
    pub fn find_config_file_in(directory: &Path) -> Option<PathBuf> {
        for candidate in Self::candidates_in(directory) {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    fn get_config_candidates() -> Vec<PathBuf> {
        std_env::current_dir()
            .map(|dir| Self::candidates_in(&dir))
            .unwrap_or_default()
    }

    fn candidates_in(directory: &Path) -> Vec<PathBuf> {
        vec![
            directory.join(env::CONFIG_FILE_NAME),
            env::local_config_file_path(directory),
        ]
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let candidates = Self::get_config_candidates();
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        if let Some(found) = Self::find_config_file() {
            println!("Active configuration: {:?}", found);
        } else {
            println!("Active configuration: none");
        }
    }
}
