//! DAG request orchestrator.
//!
//! Executes a [`TaskGraph`] in lock-step waves: every task whose
//! dependencies have completed runs concurrently with the others in its
//! wave, and the next wave starts only once the whole wave has finished.
//! The number of waves equals the depth of the graph.
//!
//! Waves are driven cooperatively on the caller's task with
//! `try_join_all`; nothing is spawned and no state is shared across threads.
//!
//! # Failure policy
//!
//! The first task failure aborts the run with [`Error::TaskFailed`]. Sibling
//! tasks still in flight in the same wave are cancelled (their futures are
//! dropped), later waves never start, and no partial results are returned.
//! A wave in which no task can start is reported as
//! [`Error::CycleDetected`], which covers cycles and dependencies on tasks
//! that are never defined.

use futures::future::try_join_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use tokio::sync::mpsc;

use crate::core::dag::TaskGraph;
use crate::error::{Error, Result};
use crate::invoke::{Invoker, ToolCall};
use crate::{olog_debug, olog_error};

/// Events emitted while a graph executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// A wave of ready tasks is about to run. `wave` starts at 1 per run.
    WaveStarted { wave: usize, tasks: Vec<String> },
    /// A task's result has been recorded.
    TaskCompleted { task: String },
    /// A task failed and the run is being aborted.
    TaskFailed { task: String, error: String },
    /// Every task completed.
    AllTasksComplete { waves: usize },
}

/// Executes task graphs with maximum wave parallelism.
///
/// # Example
///
/// ```
/// use mcpopt::core::TaskGraph;
/// use mcpopt::orchestration::RequestOrchestrator;
///
/// # tokio_test::block_on(async {
/// let graph = TaskGraph::new()
///     .with_task("fetch_docs", Vec::<String>::new())
///     .with_task("fetch_schema", Vec::<String>::new())
///     .with_task("analyze", ["fetch_docs", "fetch_schema"]);
///
/// let mut orchestrator = RequestOrchestrator::new();
/// let results = orchestrator
///     .execute_dag(&graph, |task| async move { Ok(task.len()) })
///     .await
///     .unwrap();
///
/// assert_eq!(results["analyze"], 7);
/// assert_eq!(orchestrator.total_batches(), 2);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct RequestOrchestrator {
    event_tx: Option<mpsc::Sender<OrchestratorEvent>>,
    total_requests: u64,
    total_batches: u64,
}

impl RequestOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit [`OrchestratorEvent`]s on `event_tx` during every run.
    ///
    /// Events that do not fit in the channel's buffer are dropped rather
    /// than stalling the run.
    pub fn with_events(event_tx: mpsc::Sender<OrchestratorEvent>) -> Self {
        Self {
            event_tx: Some(event_tx),
            ..Self::default()
        }
    }

    /// Tasks completed across all runs.
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    /// Waves started across all runs.
    pub fn total_batches(&self) -> u64 {
        self.total_batches
    }

    /// Execute every task in `graph`, returning each task's result.
    ///
    /// `execute` is called once per task with the task name. It is called
    /// for a task only after the results of all of its dependencies have
    /// been recorded.
    pub async fn execute_dag<F, Fut, T>(
        &mut self,
        graph: &TaskGraph,
        mut execute: F,
    ) -> Result<HashMap<String, T>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut results: HashMap<String, T> = HashMap::with_capacity(graph.task_count());
        let mut completed: HashSet<String> = HashSet::with_capacity(graph.task_count());
        let mut wave = 0;

        while completed.len() < graph.task_count() {
            let ready: Vec<String> = graph
                .ready_tasks(&completed)
                .into_iter()
                .map(str::to_string)
                .collect();

            if ready.is_empty() {
                let pending: Vec<String> = graph
                    .task_names()
                    .filter(|name| !completed.contains(*name))
                    .map(str::to_string)
                    .collect();
                olog_error!("Orchestrator stalled, unresolvable tasks: {:?}", pending);
                return Err(Error::CycleDetected { pending });
            }

            wave += 1;
            self.total_batches += 1;
            olog_debug!("Orchestrator wave {} tasks={:?}", wave, ready);
            self.emit(OrchestratorEvent::WaveStarted {
                wave,
                tasks: ready.clone(),
            });

            let batch = ready.into_iter().map(|task| {
                let fut = execute(task.clone());
                async move {
                    match fut.await {
                        Ok(value) => Ok((task, value)),
                        Err(source) => Err(Error::TaskFailed {
                            task,
                            source: Box::new(source),
                        }),
                    }
                }
            });

            let finished = match try_join_all(batch).await {
                Ok(finished) => finished,
                Err(err) => {
                    olog_error!("Orchestrator aborting at wave {}: {}", wave, err);
                    if let Error::TaskFailed { task, source } = &err {
                        self.emit(OrchestratorEvent::TaskFailed {
                            task: task.clone(),
                            error: source.to_string(),
                        });
                    }
                    return Err(err);
                }
            };

            for (task, value) in finished {
                self.total_requests += 1;
                completed.insert(task.clone());
                self.emit(OrchestratorEvent::TaskCompleted { task: task.clone() });
                results.insert(task, value);
            }
        }

        olog_debug!(
            "Orchestrator finished {} tasks in {} waves",
            results.len(),
            wave
        );
        self.emit(OrchestratorEvent::AllTasksComplete { waves: wave });
        Ok(results)
    }

    /// Execute a [`ToolPlan`] through `invoker`.
    ///
    /// The plan is validated first, so structural problems are reported
    /// before any call is made.
    pub async fn execute_plan<I>(
        &mut self,
        plan: &ToolPlan,
        invoker: &I,
    ) -> Result<HashMap<String, Value>>
    where
        I: Invoker + ?Sized,
    {
        plan.validate()?;
        self.execute_dag(plan.graph(), move |task| async move {
            let call = plan.call(&task).ok_or_else(|| {
                Error::Validation(format!("no tool call for task {}", task))
            })?;
            invoker.invoke(call).await
        })
        .await
    }

    /// Never waits on the receiver: the run and its consumer may share a task.
    fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.event_tx {
            if let Err(err) = tx.try_send(event) {
                olog_debug!("Orchestrator event dropped: {}", err);
            }
        }
    }
}

/// A task graph whose tasks are tool calls.
#[derive(Debug, Clone, Default)]
pub struct ToolPlan {
    graph: TaskGraph,
    calls: BTreeMap<String, ToolCall>,
}

impl ToolPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step named `task` that runs `call` once `dependencies` complete.
    pub fn add_step<I>(&mut self, task: impl Into<String>, call: ToolCall, dependencies: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let task = task.into();
        self.graph.add_task(task.clone(), dependencies);
        self.calls.insert(task, call);
        self
    }

    pub fn with_step<I>(mut self, task: impl Into<String>, call: ToolCall, dependencies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.add_step(task, call, dependencies);
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn call(&self, task: &str) -> Option<&ToolCall> {
        self.calls.get(task)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Check the graph structure and that every task has a call.
    pub fn validate(&self) -> Result<()> {
        if let Some(task) = self.graph.task_names().find(|t| !self.calls.contains_key(*t)) {
            return Err(Error::Validation(format!("no tool call for task {}", task)));
        }
        self.graph.validate()
    }
}
