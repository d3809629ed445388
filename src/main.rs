use anyhow::{Context, Result};
use berth::cli::progress;
use berth::cli::{Args, ExecutionMode, RunConfig};
use berth::config::ConfigDiscovery;
use berth::docker::{DockerClient, DockerClientConfig};
use berth::execution::{SchedulerConfig, TaskResult, TaskRunOptions, prepare_task_run};
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code used when the run was interrupted.
const CANCELLED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(mode.verbose());

    let exit_code = match mode {
        ExecutionMode::Run(config) => run_task(config).await?,
        ExecutionMode::ListTasks { config_override } => {
            list_tasks(config_override.as_deref())?;
            0
        }
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            0
        }
    };

    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "berth=debug" } else { "berth=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_task(config: RunConfig) -> Result<i32> {
    let project = ConfigDiscovery::load(config.config_override.as_deref())
        .context("Failed to load configuration")?;

    let client = DockerClient::with_config(DockerClientConfig {
        project_name: Some(project.project_name.clone()),
        ..Default::default()
    })
    .await
    .context("Failed to connect to the container runtime")?;
    info!("Connected to {}", client.runtime_type().await?);

    let mut scheduler_config = SchedulerConfig::default();
    if let Some(max_parallelism) = config.max_parallelism {
        scheduler_config.max_parallelism = max_parallelism;
    }

    let options = TaskRunOptions {
        scheduler: scheduler_config,
        run_id: None,
        use_tty: std::io::stdout().is_terminal(),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let scheduler = prepare_task_run(&project, &config.task, Arc::new(client), options)?
        .with_event_listener(events_tx)
        .with_cancellation(cancel_rx);

    let reporter = tokio::spawn(progress::report(events_rx));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cleaning up. Press Ctrl+C again to exit immediately.");
            let _ = cancel_tx.send(true);

            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(CANCELLED_EXIT_CODE);
            }
        }
    });

    let outcome = scheduler.run().await;
    let _ = reporter.await;
    debug!("Task run phases: {:?}", outcome.phases);

    for warning in &outcome.cleanup_warnings {
        warn!("Clean up problem: {}", warning);
    }

    let exit_code = match &outcome.result {
        TaskResult::Succeeded { exit_code } => {
            if *exit_code == 0 {
                println!("✅ Task '{}' completed successfully", config.task);
            } else {
                println!("⚠️  Task '{}' exited with code {}", config.task, exit_code);
            }
            i32::try_from(*exit_code).unwrap_or(1)
        }
        TaskResult::Failed { step, message } => {
            error!("Task '{}' failed during {}: {}", config.task, step, message);
            println!("❌ Task '{}' failed: {}", config.task, message);
            1
        }
        TaskResult::Cancelled => {
            println!("🛑 Task '{}' was cancelled", config.task);
            CANCELLED_EXIT_CODE
        }
    };

    Ok(exit_code)
}

fn list_tasks(config_override: Option<&std::path::Path>) -> Result<()> {
    let project = ConfigDiscovery::load(config_override).context("Failed to load configuration")?;

    if project.tasks.is_empty() {
        println!("No tasks defined in project '{}'", project.project_name);
        return Ok(());
    }

    println!("📋 Tasks in project '{}':", project.project_name);
    for (name, task) in &project.tasks {
        match &task.description {
            Some(description) => println!("  {} - {}", name, description),
            None => println!("  {}", name),
        }
    }

    Ok(())
}
