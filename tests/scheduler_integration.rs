//! End-to-end task runs against an in-memory container runtime.

use async_trait::async_trait;
use berth::config::ProjectConfig;
use berth::docker::{
    ContainerRuntime, DockerContainer, DockerContainerCreationRequest, DockerError, DockerImage,
    DockerNetwork, HealthStatus, ImageBuildRequest, Result,
};
use berth::execution::{
    SchedulerConfig, StepAction, StepKey, TaskEvent, TaskResult, TaskRunOptions,
    prepare_task_run,
};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use test_tag::tag;
use tokio::sync::mpsc;

/// Keeps track of what exists, the way a daemon would.
#[derive(Default)]
struct InMemoryRuntime {
    requests: Mutex<Vec<Value>>,
    containers: Mutex<Vec<String>>,
    networks: Mutex<Vec<String>>,
    refuse_network_deletion: bool,
}

impl InMemoryRuntime {
    fn leftover_containers(&self) -> Vec<String> {
        self.containers.lock().unwrap().clone()
    }

    fn leftover_networks(&self) -> Vec<String> {
        self.networks.lock().unwrap().clone()
    }

    fn request_for(&self, hostname: &str) -> Value {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|request| request["Hostname"] == hostname)
            .cloned()
            .unwrap_or_else(|| panic!("No creation request for {}", hostname))
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn build_image(&self, request: &ImageBuildRequest) -> Result<DockerImage> {
        Ok(DockerImage::new(format!("sha256:{}", request.tag)))
    }

    async fn pull_image(&self, image_name: &str) -> Result<DockerImage> {
        Ok(DockerImage::new(format!("sha256:{}", image_name)))
    }

    async fn create_network(&self, name: &str) -> Result<DockerNetwork> {
        self.networks.lock().unwrap().push(name.to_string());
        Ok(DockerNetwork::new(name))
    }

    async fn create_container(
        &self,
        request: &DockerContainerCreationRequest,
    ) -> Result<DockerContainer> {
        self.requests.lock().unwrap().push(request.to_json());
        self.containers.lock().unwrap().push(request.name.clone());
        Ok(DockerContainer::new(request.name.clone(), request.name.clone()))
    }

    async fn start_container(&self, _container: &DockerContainer) -> Result<()> {
        Ok(())
    }

    async fn wait_for_exit(&self, _container: &DockerContainer) -> Result<i64> {
        Ok(0)
    }

    async fn wait_for_health_status(&self, _container: &DockerContainer) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    async fn stop_container(&self, _container: &DockerContainer) -> Result<()> {
        Ok(())
    }

    async fn remove_container(&self, container: &DockerContainer) -> Result<()> {
        self.containers
            .lock()
            .unwrap()
            .retain(|name| name != &container.id);
        Ok(())
    }

    async fn delete_network(&self, network: &DockerNetwork) -> Result<()> {
        if self.refuse_network_deletion {
            return Err(DockerError::Other("network has active endpoints".to_string()));
        }
        self.networks.lock().unwrap().retain(|name| name != &network.id);
        Ok(())
    }
}

const PROJECT: &str = r#"
project_name = "shop"

[containers.app]
build_directory = "app"
dependencies = [{ container = "database", wait_for = "started" }]
entrypoint = ["/bin/sh", "-c"]
health_check = { interval = "2s", retries = 3, command = "true" }
devices = [{ local = "/dev/fuse", container = "/dev/fuse" }]
capabilities_to_add = ["SYS_ADMIN"]

[containers.database]
image = "postgres:16"
user = { uid = 999, gid = 999 }
enable_init_process = true

[tasks.integration]
run = { container = "app", command = ["make integration"], working_directory = "/code" }
"#;

fn options() -> TaskRunOptions {
    TaskRunOptions {
        scheduler: SchedulerConfig { max_parallelism: 2 },
        run_id: Some("it".to_string()),
        use_tty: false,
    }
}

#[tokio::test]
#[tag(integration)]
async fn test_task_run_leaves_nothing_behind() {
    let project = ProjectConfig::from_toml_str(PROJECT, Path::new("/work/shop")).unwrap();
    let runtime = Arc::new(InMemoryRuntime::default());
    let (sender, mut receiver) = mpsc::unbounded_channel();

    let outcome = prepare_task_run(&project, "integration", runtime.clone(), options())
        .unwrap()
        .with_event_listener(sender)
        .run()
        .await;

    assert_eq!(outcome.result, TaskResult::Succeeded { exit_code: 0 });
    assert!(outcome.cleanup_warnings.is_empty());
    assert!(runtime.leftover_containers().is_empty());
    assert!(runtime.leftover_networks().is_empty());

    let mut streamed = 0;
    while receiver.try_recv().is_ok() {
        streamed += 1;
    }
    assert_eq!(streamed, outcome.events.len());
}

#[tokio::test]
#[tag(integration)]
async fn test_creation_requests_carry_configuration() {
    let project = ProjectConfig::from_toml_str(PROJECT, Path::new("/work/shop")).unwrap();
    let runtime = Arc::new(InMemoryRuntime::default());

    prepare_task_run(&project, "integration", runtime.clone(), options())
        .unwrap()
        .run()
        .await;

    let app = runtime.request_for("app");
    assert_eq!(app["Image"], "sha256:shop-app:latest");
    assert_eq!(app["Cmd"], serde_json::json!(["make integration"]));
    assert_eq!(app["Entrypoint"], serde_json::json!(["/bin/sh", "-c"]));
    assert_eq!(app["WorkingDir"], "/code");
    assert_eq!(app["Healthcheck"]["Test"], serde_json::json!(["CMD-SHELL", "true"]));
    assert_eq!(app["Healthcheck"]["Interval"], 2_000_000_000i64);
    assert_eq!(app["Healthcheck"]["Retries"], 3);
    assert_eq!(app["HostConfig"]["CapAdd"], serde_json::json!(["SYS_ADMIN"]));
    assert_eq!(app["HostConfig"]["Devices"][0]["CgroupPermissions"], "rwm");
    assert_eq!(app["HostConfig"]["NetworkMode"], "shop-it");
    assert_eq!(
        app["NetworkingConfig"]["EndpointsConfig"]["shop-it"]["Aliases"],
        serde_json::json!(["app"])
    );

    let database = runtime.request_for("database");
    assert_eq!(database["Image"], "sha256:postgres:16");
    assert_eq!(database["User"], "999:999");
    assert_eq!(database["HostConfig"]["Init"], true);
    assert!(database.get("Cmd").is_none());
    assert!(database.get("Entrypoint").is_none());
    assert_eq!(database["Healthcheck"]["Interval"], 0);
}

#[tokio::test]
#[tag(integration)]
async fn test_cleanup_failure_is_reported_without_failing_the_task() {
    let project = ProjectConfig::from_toml_str(PROJECT, Path::new("/work/shop")).unwrap();
    let runtime = Arc::new(InMemoryRuntime {
        refuse_network_deletion: true,
        ..Default::default()
    });

    let outcome = prepare_task_run(&project, "integration", runtime.clone(), options())
        .unwrap()
        .run()
        .await;

    assert_eq!(outcome.result, TaskResult::Succeeded { exit_code: 0 });
    assert_eq!(outcome.cleanup_warnings.len(), 1);
    assert!(outcome.cleanup_warnings[0].contains("network has active endpoints"));
    assert!(runtime.leftover_containers().is_empty());
    assert_eq!(runtime.leftover_networks(), vec!["shop-it"]);

    let failed_deletion = outcome.events.snapshot().iter().any(|event| {
        event.is_failure()
            && event.resolves() == Some(StepKey::network(StepAction::DeleteNetwork))
    });
    assert!(failed_deletion);
    assert!(
        !outcome
            .events
            .snapshot()
            .contains(&TaskEvent::TaskNetworkDeleted)
    );
}
