//! Orchestration tests.
//!
//! These tests verify wave scheduling through the public orchestrator API:
//! wave counts, parallelism on the paused clock, and failure handling.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use mcpopt::core::TaskGraph;
use mcpopt::invoke::{SimulatedInvoker, ToolCall};
use mcpopt::orchestration::{OrchestratorEvent, RequestOrchestrator, ToolPlan};
use mcpopt::Error;

use crate::fixtures::{
    chain_graph, flat_invoker, independent_graph, research_graph, OrchestratorHarness,
};

/// Test: Independent tasks share one wave
/// Given 8 tasks with no dependencies
/// When the graph executes
/// Then there is exactly one batch and every task completes
#[tokio::test]
async fn test_independent_tasks_single_wave() {
    let mut harness = OrchestratorHarness::new();
    let results = harness
        .orchestrator
        .execute_dag(&independent_graph(8), |task| async move { Ok(task) })
        .await
        .unwrap();

    assert_eq!(results.len(), 8);
    assert_eq!(results["task-3"], "task-3");
    assert_eq!(harness.orchestrator.total_batches(), 1);
    assert_eq!(harness.waves(), vec![(0..8).map(|i| format!("task-{}", i)).collect::<Vec<_>>()]);
}

/// Test: A chain runs one task per wave
#[tokio::test]
async fn test_chain_runs_sequentially() {
    let graph = chain_graph(5);
    let mut harness = OrchestratorHarness::new();
    harness
        .orchestrator
        .execute_dag(&graph, |_| async { Ok(()) })
        .await
        .unwrap();

    let waves = harness.waves();
    assert_eq!(waves.len(), 5);
    for (i, wave) in waves.iter().enumerate() {
        assert_eq!(wave, &vec![format!("task-{}", i)]);
    }
    assert_eq!(harness.orchestrator.total_batches() as usize, graph.depth().unwrap());
}

/// Test: Wave count equals graph depth for mixed shapes
#[tokio::test]
async fn test_wave_count_matches_depth() {
    let graphs = [
        research_graph(),
        chain_graph(3),
        independent_graph(4),
        TaskGraph::new()
            .with_task("a", Vec::<String>::new())
            .with_task("b", ["a"])
            .with_task("c", ["a"])
            .with_task("d", ["b", "c"])
            .with_task("e", Vec::<String>::new()),
    ];
    for graph in &graphs {
        let mut orch = RequestOrchestrator::new();
        orch.execute_dag(graph, |_| async { Ok(()) }).await.unwrap();
        assert_eq!(orch.total_batches() as usize, graph.depth().unwrap());
        assert_eq!(orch.total_requests() as usize, graph.task_count());
    }
}

/// Test: Orchestrated latency tracks depth, not task count
/// Given the research graph and a 100ms provider
/// When executed through a plan
/// Then the run takes three provider latencies, not four
#[tokio::test(start_paused = true)]
async fn test_plan_latency_tracks_depth() {
    let invoker = flat_invoker(100);
    let plan = ToolPlan::new()
        .with_step("fetch_docs", ToolCall::new("fetch_docs"), Vec::<String>::new())
        .with_step("fetch_schema", ToolCall::new("fetch_schema"), Vec::<String>::new())
        .with_step("analyze", ToolCall::new("analyze"), ["fetch_docs", "fetch_schema"])
        .with_step("summarize", ToolCall::new("summarize"), ["analyze"]);
    assert_eq!(plan.graph(), &research_graph());

    let mut orch = RequestOrchestrator::new();
    let start = Instant::now();
    let results = orch.execute_plan(&plan, &invoker).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 4);
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(400), "took {:?}", elapsed);
}

/// Test: Dependent callbacks start only after upstream tasks finish
#[tokio::test]
async fn test_dependents_start_after_upstream() {
    let seen = Rc::new(RefCell::new(Vec::<String>::new()));
    let graph = research_graph();
    let mut orch = RequestOrchestrator::new();

    let log = Rc::clone(&seen);
    orch.execute_dag(&graph, move |task| {
        let log = Rc::clone(&log);
        async move {
            sleep(Duration::from_millis(1)).await;
            log.borrow_mut().push(task);
            Ok(())
        }
    })
    .await
    .unwrap();

    let order = seen.borrow();
    let pos = |name: &str| order.iter().position(|t| t == name).unwrap();
    assert!(pos("fetch_docs") < pos("analyze"));
    assert!(pos("fetch_schema") < pos("analyze"));
    assert_eq!(order.last().map(String::as_str), Some("summarize"));
}

/// Test: Task failure is distinct from a cycle
#[tokio::test(start_paused = true)]
async fn test_failure_distinct_from_cycle() {
    let invoker = flat_invoker(10).fail_on("fetch_schema");
    let plan = ToolPlan::new()
        .with_step("fetch_docs", ToolCall::new("fetch_docs"), Vec::<String>::new())
        .with_step("fetch_schema", ToolCall::new("fetch_schema"), Vec::<String>::new())
        .with_step("analyze", ToolCall::new("analyze"), ["fetch_docs", "fetch_schema"]);

    let mut harness = OrchestratorHarness::new();
    let err = harness
        .orchestrator
        .execute_plan(&plan, &invoker)
        .await
        .unwrap_err();
    assert!(!err.is_structural());
    assert_eq!(err.failed_task(), Some("fetch_schema"));
    assert_eq!(invoker.call_count(), 2);

    let events = harness.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, OrchestratorEvent::TaskFailed { task, .. } if task == "fetch_schema")));

    let cyclic = TaskGraph::new().with_task("x", ["y"]).with_task("y", ["x"]);
    let err = harness
        .orchestrator
        .execute_dag(&cyclic, |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert!(err.is_structural());
    assert!(err.failed_task().is_none());
}

/// Test: A cycle behind runnable tasks stalls after they finish
#[tokio::test]
async fn test_cycle_after_runnable_prefix() {
    let graph = TaskGraph::new()
        .with_task("root", Vec::<String>::new())
        .with_task("loop_a", ["root", "loop_b"])
        .with_task("loop_b", ["loop_a"]);

    let mut orch = RequestOrchestrator::new();
    let err = orch
        .execute_dag(&graph, |_| async { Ok(()) })
        .await
        .unwrap_err();

    match err {
        Error::CycleDetected { pending } => assert_eq!(pending, vec!["loop_a", "loop_b"]),
        other => panic!("expected cycle, got {:?}", other),
    }
    assert_eq!(orch.total_requests(), 1);
    assert_eq!(orch.total_batches(), 1);
}

/// Test: Jittered provider still completes every task once
#[tokio::test(start_paused = true)]
async fn test_jittered_provider() {
    let invoker = SimulatedInvoker::default();
    let graph = independent_graph(6);
    let plan = graph
        .task_names()
        .fold(ToolPlan::new(), |plan, task| {
            plan.with_step(task, ToolCall::new(task), Vec::<String>::new())
        });

    let mut orch = RequestOrchestrator::new();
    let start = Instant::now();
    let results = orch.execute_plan(&plan, &invoker).await.unwrap();

    assert_eq!(results.len(), 6);
    assert_eq!(invoker.call_count(), 6);
    let slowest = graph
        .task_names()
        .map(|t| invoker.latency_for(t))
        .max()
        .unwrap();
    assert!(start.elapsed() >= slowest);
}

/// Test: A small event buffer never stalls a large graph
/// Given 50 independent tasks and an 8-slot event channel nobody drains
/// When the graph executes
/// Then the run completes and only the buffered events are kept
#[tokio::test(start_paused = true)]
async fn test_small_event_buffer_with_large_graph() {
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let mut orch = RequestOrchestrator::with_events(tx);
    let graph = independent_graph(50);

    let results = tokio::time::timeout(
        Duration::from_secs(60),
        orch.execute_dag(&graph, |_| async {
            sleep(Duration::from_millis(1)).await;
            Ok(())
        }),
    )
    .await
    .expect("run finished without a reader on the event channel")
    .unwrap();

    assert_eq!(results.len(), 50);
    let mut buffered = 0;
    while rx.try_recv().is_ok() {
        buffered += 1;
    }
    assert_eq!(buffered, 8);
}
