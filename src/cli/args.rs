//! Command line argument parsing
//!
//! Subcommands:
//! - `run`: Run a task and everything it depends on
//! - `tasks`: List the tasks defined in the configuration
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Run(RunConfig),
    ListTasks { config_override: Option<PathBuf> },
    ShowConfig,
}

impl ExecutionMode {
    pub fn verbose(&self) -> bool {
        matches!(self, ExecutionMode::Run(config) if config.verbose)
    }
}

#[derive(Debug)]
pub struct RunConfig {
    pub task: String,
    pub config_override: Option<PathBuf>,
    pub max_parallelism: Option<usize>,
    pub verbose: bool,
}

#[derive(Debug, Parser)]
#[command(name = "berth")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run development tasks in throwaway Docker containers")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a task, starting its dependencies first and cleaning up afterwards
    Run {
        /// Name of the task to run
        task: String,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Maximum number of steps to execute at the same time
        #[arg(long = "max-parallelism", value_name = "N")]
        max_parallelism: Option<usize>,
        /// Enable verbose output
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
    /// List the tasks defined in the configuration
    Tasks {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Run {
                task,
                config,
                max_parallelism,
                verbose,
            }) => {
                if *max_parallelism == Some(0) {
                    return Err("--max-parallelism must be at least 1".to_string());
                }

                Ok(ExecutionMode::Run(RunConfig {
                    task: task.clone(),
                    config_override: config.clone(),
                    max_parallelism: *max_parallelism,
                    verbose: *verbose,
                }))
            }
            Some(Commands::Tasks { config }) => Ok(ExecutionMode::ListTasks {
                config_override: config.clone(),
            }),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'berth --help' to see available commands.".to_string(),
            ),
        }
    }
}
