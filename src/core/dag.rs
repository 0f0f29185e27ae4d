//! Task graph for request orchestration.
//!
//! A [`TaskGraph`] maps each task name to the names it depends on. It is
//! built by the caller for a single orchestration run. The petgraph view
//! is only built for analysis (validation, ordering, depth); execution works
//! directly on the name map.

use crate::error::{Error, Result};
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Named tasks and their dependencies.
///
/// Tasks iterate in name order, so ready sets and error reports are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskGraph {
    tasks: BTreeMap<String, Vec<String>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task, replacing any previous dependency list for the same name.
    pub fn add_task<I>(&mut self, name: impl Into<String>, dependencies: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.tasks
            .insert(name.into(), dependencies.into_iter().map(Into::into).collect());
        self
    }

    /// Builder-style variant of [`TaskGraph::add_task`].
    pub fn with_task<I>(mut self, name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.add_task(name, dependencies);
        self
    }

    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.tasks.get(name).map(Vec::as_slice)
    }

    pub fn contains_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tasks.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks not yet completed whose dependencies are all in `completed`.
    pub fn ready_tasks<'a>(&'a self, completed: &HashSet<String>) -> Vec<&'a str> {
        self.tasks
            .iter()
            .filter(|(name, _)| !completed.contains(name.as_str()))
            .filter(|(_, deps)| deps.iter().all(|d| completed.contains(d)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Check that every dependency names a task and that there is no cycle.
    pub fn validate(&self) -> Result<()> {
        self.sorted().map(|_| ())
    }

    /// Task names ordered so each task follows all of its dependencies.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        let (graph, order) = self.sorted()?;
        Ok(order.into_iter().map(|node| graph[node]).collect())
    }

    /// Length of the longest dependency chain, counted in tasks.
    ///
    /// This is the number of waves the orchestrator needs for this graph.
    pub fn depth(&self) -> Result<usize> {
        let (graph, order) = self.sorted()?;

        let mut level: HashMap<NodeIndex, usize> = HashMap::with_capacity(order.len());
        for node in order {
            let own = graph
                .neighbors_directed(node, Direction::Incoming)
                .filter_map(|dep| level.get(&dep).copied())
                .max()
                .unwrap_or(0)
                + 1;
            level.insert(node, own);
        }
        Ok(level.values().copied().max().unwrap_or(0))
    }

    /// Build the petgraph view and sort it topologically.
    fn sorted(&self) -> Result<(DiGraph<&str, ()>, Vec<NodeIndex>)> {
        let graph = self.to_graph()?;
        match toposort(&graph, None) {
            Ok(order) => Ok((graph, order)),
            Err(_) => Err(cycle_error(&graph)),
        }
    }

    /// Edges point from a dependency to its dependent.
    fn to_graph(&self) -> Result<DiGraph<&str, ()>> {
        let mut graph = DiGraph::with_capacity(self.tasks.len(), 0);
        let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(self.tasks.len());
        for name in self.tasks.keys() {
            index.insert(name.as_str(), graph.add_node(name.as_str()));
        }
        for (name, deps) in &self.tasks {
            for dep in deps {
                let from = index
                    .get(dep.as_str())
                    .ok_or_else(|| Error::UnknownDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    })?;
                graph.add_edge(*from, index[name.as_str()], ());
            }
        }
        Ok(graph)
    }
}

/// Report every task that sits on a cycle.
fn cycle_error(graph: &DiGraph<&str, ()>) -> Error {
    let mut pending: Vec<String> = kosaraju_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|node| graph[node].to_string())
        .collect();
    pending.sort();
    Error::CycleDetected { pending }
}

impl<K, I, D> FromIterator<(K, I)> for TaskGraph
where
    K: Into<String>,
    I: IntoIterator<Item = D>,
    D: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut graph = TaskGraph::new();
        for (name, deps) in iter {
            graph.add_task(name, deps);
        }
        graph
    }
}

impl From<HashMap<String, Vec<String>>> for TaskGraph {
    fn from(map: HashMap<String, Vec<String>>) -> Self {
        Self {
            tasks: map.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, Vec<String>>> for TaskGraph {
    fn from(tasks: BTreeMap<String, Vec<String>>) -> Self {
        Self { tasks }
    }
}
