use super::*;
use crate::config::{Container, Dependency, Readiness, TaskConfig, TaskRunConfig};
use crate::docker::{DockerContainer, DockerImage, DockerNetwork};
use crate::execution::steps::StepAction;
use std::collections::BTreeMap;
use std::path::PathBuf;

fn built(name: &str) -> Container {
    Container::new(
        name,
        ImageSource::Build {
            build_directory: PathBuf::from(format!("./{}", name)),
            dockerfile: None,
            build_args: BTreeMap::new(),
        },
    )
}

fn pulled(name: &str) -> Container {
    Container::new(
        name,
        ImageSource::Pull {
            image_name: format!("{}:1.0", name),
        },
    )
}

fn graph(task_container: &str, containers: Vec<Container>) -> TaskGraph {
    let task = TaskConfig {
        name: "test".to_string(),
        description: None,
        run: TaskRunConfig {
            container: task_container.to_string(),
            ..Default::default()
        },
        dependencies: Vec::new(),
    };
    let containers: BTreeMap<String, Container> =
        containers.into_iter().map(|c| (c.name.clone(), c)).collect();
    TaskGraph::build(&task, &containers).unwrap()
}

fn network_created() -> TaskEvent {
    TaskEvent::TaskNetworkCreated {
        network: DockerNetwork::new("net-1"),
    }
}

fn image_built(container: &str) -> TaskEvent {
    TaskEvent::ImageBuilt {
        container: container.to_string(),
        image: DockerImage::new(format!("sha256:{}", container)),
    }
}

fn created(container: &str) -> TaskEvent {
    TaskEvent::ContainerCreated {
        container: container.to_string(),
        docker_container: docker_container(container),
    }
}

fn started(container: &str) -> TaskEvent {
    TaskEvent::ContainerStarted {
        container: container.to_string(),
    }
}

fn healthy(container: &str) -> TaskEvent {
    TaskEvent::ContainerBecameHealthy {
        container: container.to_string(),
    }
}

fn docker_container(container: &str) -> DockerContainer {
    DockerContainer::new(format!("id-{}", container), format!("shop-{}-1", container))
}

#[test]
fn test_build_image_rule_is_ready_with_no_events() {
    let rule = BuildImageStepRule::new(built("the-container"), "the-image-tag");

    assert_eq!(
        rule.evaluate(&[]),
        RuleEvaluation::Ready(TaskStep::BuildImage {
            container: built("the-container"),
            image_tag: "the-image-tag".to_string(),
        })
    );
    assert_eq!(
        rule.to_string(),
        "BuildImageStepRule(container: 'the-container', image tag: 'the-image-tag')"
    );
}

#[test]
fn test_create_container_waits_for_image_and_network() {
    let rule = CreateContainerStepRule::new(built("app"), ContainerRole::Task, Vec::new());

    assert_eq!(rule.evaluate(&[]), RuleEvaluation::NotReady);
    assert_eq!(rule.evaluate(&[image_built("app")]), RuleEvaluation::NotReady);
    assert_eq!(rule.evaluate(&[network_created()]), RuleEvaluation::NotReady);

    assert_eq!(
        rule.evaluate(&[network_created(), image_built("app")]),
        RuleEvaluation::Ready(TaskStep::CreateContainer {
            container: built("app"),
            role: ContainerRole::Task,
            image: DockerImage::new("sha256:app"),
            network: DockerNetwork::new("net-1"),
        })
    );
}

#[test]
fn test_create_container_honors_edge_readiness() {
    let dependencies = vec![
        Dependency {
            container: "db".to_string(),
            wait_for: Readiness::Healthy,
        },
        Dependency {
            container: "mock".to_string(),
            wait_for: Readiness::Started,
        },
    ];
    let rule = CreateContainerStepRule::new(built("app"), ContainerRole::Task, dependencies);

    let mut events = vec![network_created(), image_built("app"), started("db")];
    assert_eq!(rule.evaluate(&events), RuleEvaluation::NotReady);

    events.push(started("mock"));
    assert_eq!(rule.evaluate(&events), RuleEvaluation::NotReady);

    events.push(healthy("db"));
    assert!(matches!(rule.evaluate(&events), RuleEvaluation::Ready(_)));
}

#[test]
fn test_lifecycle_rules_wait_for_creation() {
    let start = StartContainerStepRule::new("db");
    let wait = WaitForContainerToBecomeHealthyStepRule::new("db");
    let run = RunContainerStepRule::new("app");

    assert_eq!(start.evaluate(&[]), RuleEvaluation::NotReady);
    assert_eq!(run.evaluate(&[]), RuleEvaluation::NotReady);

    let events = vec![created("db")];
    assert_eq!(
        start.evaluate(&events),
        RuleEvaluation::Ready(TaskStep::StartContainer {
            container: "db".to_string(),
            docker_container: docker_container("db"),
        })
    );
    assert_eq!(wait.evaluate(&events), RuleEvaluation::NotReady);

    let events = vec![created("db"), started("db")];
    assert!(matches!(wait.evaluate(&events), RuleEvaluation::Ready(_)));
}

#[test]
fn test_evaluation_is_pure_and_stable_under_more_events() {
    let graph = graph(
        "app",
        vec![
            built("app").with_dependency("db", Readiness::Healthy),
            pulled("db"),
        ],
    );
    let rules = RuleSet::for_task(&graph, "shop", "run1");

    let events = vec![
        network_created(),
        image_built("app"),
        TaskEvent::ImagePulled {
            container: "db".to_string(),
            image: DockerImage::new("sha256:db"),
        },
        created("db"),
        started("db"),
        healthy("db"),
    ];
    let mut superset = events.clone();
    superset.push(created("app"));

    for rule in rules.iter() {
        let first = rule.evaluate(&events);
        assert_eq!(first, rule.evaluate(&events), "{} is not pure", rule);

        if let RuleEvaluation::Ready(step) = first {
            assert_eq!(
                rule.evaluate(&superset),
                RuleEvaluation::Ready(step),
                "{} changed its step",
                rule
            );
        }
    }
}

#[test]
fn test_rule_set_for_task() {
    let graph = graph(
        "app",
        vec![
            built("app").with_dependency("db", Readiness::Healthy),
            pulled("db"),
        ],
    );
    let rules = RuleSet::for_task(&graph, "shop", "run1");

    assert_eq!(
        rules.keys(),
        &[
            StepKey::network(StepAction::CreateNetwork),
            StepKey::container("app", StepAction::BuildImage),
            StepKey::container("app", StepAction::CreateContainer),
            StepKey::container("app", StepAction::RunContainer),
            StepKey::container("db", StepAction::PullImage),
            StepKey::container("db", StepAction::CreateContainer),
            StepKey::container("db", StepAction::StartContainer),
            StepKey::container("db", StepAction::WaitForHealthy),
        ]
    );

    match rules.get(&StepKey::container("app", StepAction::BuildImage)) {
        Some(TaskStepRule::BuildImage(rule)) => assert_eq!(rule.image_tag, "shop-app:latest"),
        other => panic!("unexpected rule: {:?}", other),
    }
    match rules.get(&StepKey::network(StepAction::CreateNetwork)) {
        Some(TaskStepRule::CreateTaskNetwork(rule)) => assert_eq!(rule.network_name, "shop-run1"),
        other => panic!("unexpected rule: {:?}", other),
    }
}

#[test]
fn test_rule_set_rejects_duplicate_keys() {
    let mut rules = RuleSet::new();
    assert!(rules.add(TaskStepRule::StartContainer(StartContainerStepRule::new("db"))));
    assert!(!rules.add(TaskStepRule::StartContainer(StartContainerStepRule::new("db"))));
    assert_eq!(rules.len(), 1);
}

#[test]
fn test_teardown_of_nothing_created_only_deletes_the_network() {
    let graph = graph(
        "a",
        vec![
            built("a").with_dependency("b", Readiness::Healthy),
            built("b").with_dependency("c", Readiness::Healthy),
            built("c"),
        ],
    );
    let events = vec![
        network_created(),
        image_built("a"),
        image_built("b"),
        TaskEvent::StepFailed {
            step: TaskStep::BuildImage {
                container: built("c"),
                image_tag: "shop-c:latest".to_string(),
            },
            message: "Dockerfile not found".to_string(),
        },
    ];

    let rules = teardown_rules(&graph, &events);
    let keys: Vec<StepKey> = rules.iter().map(TaskStepRule::key).collect();

    assert_eq!(
        keys,
        vec![
            StepKey::network(StepAction::DeleteNetwork),
            StepKey::task(StepAction::ReportCleanupFailure),
        ]
    );
    assert_eq!(
        rules[0].evaluate(&events),
        RuleEvaluation::Ready(TaskStep::DeleteTaskNetwork {
            network: DockerNetwork::new("net-1"),
        })
    );
}

#[test]
fn test_teardown_order_follows_dependents() {
    let graph = graph(
        "app",
        vec![
            built("app").with_dependency("db", Readiness::Healthy),
            pulled("db"),
        ],
    );
    let mut events = vec![
        network_created(),
        created("db"),
        started("db"),
        healthy("db"),
        created("app"),
        started("app"),
        TaskEvent::ContainerExited {
            container: "app".to_string(),
            exit_code: 0,
        },
    ];

    let mut rules = RuleSet::new();
    for rule in teardown_rules(&graph, &events) {
        rules.add(rule);
    }

    // app has exited, so it is only removed; db is still running.
    assert!(rules.get(&StepKey::container("app", StepAction::StopContainer)).is_none());
    let remove_app = rules
        .get(&StepKey::container("app", StepAction::RemoveContainer))
        .unwrap();
    let stop_db = rules
        .get(&StepKey::container("db", StepAction::StopContainer))
        .unwrap();
    let remove_db = rules
        .get(&StepKey::container("db", StepAction::RemoveContainer))
        .unwrap();
    let delete_network = rules
        .get(&StepKey::network(StepAction::DeleteNetwork))
        .unwrap();

    assert!(matches!(remove_app.evaluate(&events), RuleEvaluation::Ready(_)));
    assert_eq!(stop_db.evaluate(&events), RuleEvaluation::NotReady);
    assert_eq!(delete_network.evaluate(&events), RuleEvaluation::NotReady);

    events.push(TaskEvent::ContainerRemoved {
        container: "app".to_string(),
    });
    assert!(matches!(stop_db.evaluate(&events), RuleEvaluation::Ready(_)));
    assert_eq!(remove_db.evaluate(&events), RuleEvaluation::NotReady);

    events.push(TaskEvent::ContainerStopped {
        container: "db".to_string(),
    });
    assert!(matches!(remove_db.evaluate(&events), RuleEvaluation::Ready(_)));
    assert_eq!(delete_network.evaluate(&events), RuleEvaluation::NotReady);

    events.push(TaskEvent::ContainerRemoved {
        container: "db".to_string(),
    });
    assert!(matches!(
        delete_network.evaluate(&events),
        RuleEvaluation::Ready(_)
    ));
}

#[test]
fn test_failed_teardown_step_counts_as_resolved() {
    let graph = graph("app", vec![pulled("app")]);
    let mut events = vec![network_created(), created("app")];

    let rules = teardown_rules(&graph, &events);
    let delete_network = rules
        .iter()
        .find(|rule| rule.key() == StepKey::network(StepAction::DeleteNetwork))
        .unwrap();
    let report = rules
        .iter()
        .find(|rule| rule.key() == StepKey::task(StepAction::ReportCleanupFailure))
        .unwrap();

    events.push(TaskEvent::StepFailed {
        step: TaskStep::RemoveContainer {
            container: "app".to_string(),
            docker_container: docker_container("app"),
        },
        message: "device or resource busy".to_string(),
    });

    assert!(matches!(
        delete_network.evaluate(&events),
        RuleEvaluation::Ready(_)
    ));
    assert_eq!(report.evaluate(&events), RuleEvaluation::NotReady);

    events.push(TaskEvent::TaskNetworkDeleted);
    match report.evaluate(&events) {
        RuleEvaluation::Ready(TaskStep::CleanupFailed {
            reason,
            manual_cleanup_commands,
        }) => {
            assert!(reason.contains("device or resource busy"));
            assert_eq!(manual_cleanup_commands, vec!["docker rm --force shop-app-1"]);
        }
        other => panic!("unexpected evaluation: {:?}", other),
    }
}

#[test]
fn test_cleanup_report_stays_quiet_when_teardown_succeeds() {
    let graph = graph("app", vec![pulled("app")]);
    let events = vec![
        network_created(),
        created("app"),
        TaskEvent::ContainerRemoved {
            container: "app".to_string(),
        },
        TaskEvent::TaskNetworkDeleted,
    ];

    let rules = teardown_rules(&graph, &events);
    let report = rules.last().unwrap();

    assert_eq!(report.key(), StepKey::task(StepAction::ReportCleanupFailure));
    assert_eq!(report.evaluate(&events), RuleEvaluation::NotReady);
}

#[test]
fn test_manual_cleanup_commands_are_shell_escaped() {
    let container = DockerContainer::new("id", "odd name");
    assert_eq!(remove_container_command(&container), "docker rm --force 'odd name'");
    assert_eq!(
        delete_network_command(&DockerNetwork::new("abc123")),
        "docker network rm abc123"
    );
}
