use crate::config::{Container, Dependency, TaskConfig};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Task '{task}' runs container '{container}', which is not defined")]
    UnknownTaskContainer { task: String, container: String },

    #[error("Container '{from}' depends on container '{to}', which is not defined")]
    UnknownReference { from: String, to: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },
}

/// The containers one task run needs, wired by their dependencies.
///
/// Nodes are the task container plus everything reachable from it. The task's
/// own dependencies are folded into the task container's edges.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    task: TaskConfig,
    nodes: Vec<String>,
    containers: HashMap<String, Container>,
    dependencies: HashMap<String, Vec<Dependency>>,
    dependents: HashMap<String, Vec<String>>,
}

impl TaskGraph {
    pub fn build(
        task: &TaskConfig,
        containers: &BTreeMap<String, Container>,
    ) -> Result<Self, GraphError> {
        let task_container = containers.get(&task.run.container).ok_or_else(|| {
            GraphError::UnknownTaskContainer {
                task: task.name.clone(),
                container: task.run.container.clone(),
            }
        })?;

        let mut graph = Self {
            task: task.clone(),
            nodes: Vec::new(),
            containers: HashMap::new(),
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
        };

        let mut task_edges = task_container.dependencies.clone();
        for dependency in &task.dependencies {
            if !task_edges.iter().any(|d| d.container == dependency.container) {
                task_edges.push(dependency.clone());
            }
        }

        let mut visited = HashSet::new();
        let mut path = Vec::new();
        graph.visit(
            task_container,
            task_edges,
            containers,
            &mut visited,
            &mut path,
        )?;

        Ok(graph)
    }

    fn visit(
        &mut self,
        container: &Container,
        edges: Vec<Dependency>,
        containers: &BTreeMap<String, Container>,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if let Some(start) = path.iter().position(|name| name == &container.name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(container.name.clone());
            return Err(GraphError::CyclicDependency { path: cycle });
        }

        if visited.contains(&container.name) {
            return Ok(());
        }

        visited.insert(container.name.clone());
        path.push(container.name.clone());
        self.nodes.push(container.name.clone());
        self.containers
            .insert(container.name.clone(), container.clone());
        self.dependents.entry(container.name.clone()).or_default();

        for dependency in &edges {
            let target = containers.get(&dependency.container).ok_or_else(|| {
                GraphError::UnknownReference {
                    from: container.name.clone(),
                    to: dependency.container.clone(),
                }
            })?;

            self.visit(
                target,
                target.dependencies.clone(),
                containers,
                visited,
                path,
            )?;

            self.dependents
                .entry(dependency.container.clone())
                .or_default()
                .push(container.name.clone());
        }

        self.dependencies.insert(container.name.clone(), edges);
        path.pop();
        Ok(())
    }

    pub fn task(&self) -> &TaskConfig {
        &self.task
    }

    pub fn task_container_name(&self) -> &str {
        &self.task.run.container
    }

    /// Container names in first-visit order, task container first.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.get(name)
    }

    pub fn dependencies_of(&self, name: &str) -> &[Dependency] {
        self.dependencies
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Containers that depend on `name`.
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_task_container(&self, name: &str) -> bool {
        name == self.task.run.container
    }
}
