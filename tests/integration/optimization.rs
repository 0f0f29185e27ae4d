//! End-to-end optimization tests.
//!
//! A small gateway composes the primitives the way a calling layer would:
//! consult the cache, route through the balancer, invoke, record latency,
//! release, and fill the cache.

use serde_json::Value;
use std::cell::RefCell;
use std::time::Duration;
use tokio::time::Instant;

use mcpopt::benchmark::{BenchmarkResult, LatencySummary, OptimizationMetrics};
use mcpopt::core::{Context, ContextCache, LoadBalancer, PerformanceMonitor};
use mcpopt::invoke::{Invoker, SimulatedInvoker, ToolCall};
use mcpopt::orchestration::RequestOrchestrator;
use mcpopt::util::with_timeout;
use mcpopt::{Error, Result};

use crate::fixtures::{ctx, flat_invoker, research_graph};

struct Gateway {
    cache: RefCell<ContextCache<Value>>,
    balancer: RefCell<LoadBalancer>,
    monitor: RefCell<PerformanceMonitor>,
    invoker: SimulatedInvoker,
}

impl Gateway {
    fn new(invoker: SimulatedInvoker) -> Self {
        let mut balancer = LoadBalancer::new();
        balancer.register_server("nlp_server", ["search", "summarize"]);
        balancer.register_server("data_server", ["search", "aggregate"]);
        Self {
            cache: RefCell::new(ContextCache::new(16)),
            balancer: RefCell::new(balancer),
            monitor: RefCell::new(PerformanceMonitor::new(4)),
            invoker,
        }
    }

    /// Borrows are never held across an await.
    async fn call(&self, capability: &str, query: &str, context: &Context) -> Result<Value> {
        if let Some(hit) = self.cache.borrow_mut().get(query, context) {
            return Ok(hit.clone());
        }

        let server = self
            .balancer
            .borrow_mut()
            .select_server([capability])
            .ok_or_else(|| Error::Validation(format!("no provider for {}", capability)))?;

        let start = Instant::now();
        let call = ToolCall::new(query).with_argument("server", server.as_str());
        let outcome = with_timeout(Duration::from_secs(1), self.invoker.invoke(&call)).await;
        self.balancer.borrow_mut().release(&server);
        let value = outcome?;

        self.monitor.borrow_mut().record_duration(start.elapsed());
        self.cache.borrow_mut().put(query, context, value.clone());
        Ok(value)
    }
}

/// Test: Repeated queries are served from cache per context
/// Given two users issuing the same queries
/// When each user repeats a query
/// Then only the first of each (query, user) pair reaches a provider
#[tokio::test(start_paused = true)]
async fn test_cache_in_front_of_provider() {
    let gateway = Gateway::new(flat_invoker(20));
    let alice = ctx(&[("user", "alice"), ("role", "admin")]);
    let bob = ctx(&[("user", "bob"), ("role", "viewer")]);

    for context in [&alice, &bob] {
        for query in ["search:logs", "search:metrics", "search:logs"] {
            gateway.call("search", query, context).await.unwrap();
        }
    }

    let cache = gateway.cache.borrow();
    assert_eq!(cache.hits(), 2);
    assert_eq!(cache.misses(), 4);
    assert_eq!(gateway.invoker.call_count(), 4);
    assert!((cache.hit_rate() - 2.0 / 6.0).abs() < 1e-9);
}

/// Test: Key order of the context does not split the cache
#[tokio::test(start_paused = true)]
async fn test_context_order_independent() {
    let gateway = Gateway::new(flat_invoker(5));
    let forward = ctx(&[("user", "alice"), ("role", "admin")]);
    let reverse = ctx(&[("role", "admin"), ("user", "alice")]);

    gateway.call("search", "search:logs", &forward).await.unwrap();
    gateway.call("search", "search:logs", &reverse).await.unwrap();
    assert_eq!(gateway.invoker.call_count(), 1);
}

/// Test: Balancer loads return to zero after every call
/// Including calls whose provider fails
#[tokio::test(start_paused = true)]
async fn test_balancer_released_after_failures() {
    let gateway = Gateway::new(flat_invoker(5).fail_on("search:broken"));
    let user = ctx(&[("user", "carol")]);

    gateway.call("search", "search:a", &user).await.unwrap();
    let err = gateway.call("search", "search:broken", &user).await.unwrap_err();
    assert!(matches!(err, Error::Tool { .. }));
    gateway.call("summarize", "summarize:a", &user).await.unwrap();

    let balancer = gateway.balancer.borrow();
    assert_eq!(balancer.current_load("nlp_server"), Some(0));
    assert_eq!(balancer.current_load("data_server"), Some(0));
    let dist = balancer.load_distribution();
    assert_eq!(dist.values().sum::<u64>(), 3);
    // Failed results are not cached
    assert!(!gateway.cache.borrow().contains("search:broken", &user));
}

/// Test: Missing capability is not a provider fault
#[tokio::test]
async fn test_unroutable_capability() {
    let gateway = Gateway::new(flat_invoker(0));
    let err = gateway
        .call("classify", "classify:x", &ctx(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(gateway.invoker.call_count(), 0);
}

/// Test: Orchestrated calls through the gateway feed the monitor
/// Given a provider that slows down between two runs
/// When the research graph runs twice
/// Then the monitor flags the regression
#[tokio::test(start_paused = true)]
async fn test_orchestrated_gateway_detects_regression() {
    let graph = research_graph();
    let mut orch = RequestOrchestrator::new();

    let fast = Gateway::new(flat_invoker(10));
    let user = ctx(&[("user", "dave")]);
    let (gateway, user_ref) = (&fast, &user);
    orch.execute_dag(&graph, move |task| async move {
        gateway.call("search", &task, user_ref).await
    })
    .await
    .unwrap();
    assert!(!fast.monitor.borrow().regression_detected());

    // Same monitor, slower provider, fresh cache
    let slow = Gateway {
        cache: RefCell::new(ContextCache::new(16)),
        balancer: RefCell::new(fast.balancer.borrow().clone()),
        monitor: RefCell::new(fast.monitor.borrow().clone()),
        invoker: flat_invoker(50),
    };
    let gateway = &slow;
    orch.execute_dag(&graph, move |task| async move {
        gateway.call("search", &task, user_ref).await
    })
    .await
    .unwrap();

    let monitor = slow.monitor.borrow();
    assert_eq!(monitor.len(), 8);
    assert!(monitor.regression_detected());
    assert_eq!(orch.total_batches(), 6);
    assert_eq!(orch.total_requests(), 8);
}

/// Test: Orchestration improvement is reported as a positive percentage
#[tokio::test(start_paused = true)]
async fn test_reporting_orchestration_gain() {
    let invoker = flat_invoker(100);
    let graph = research_graph();

    let sequential_start = Instant::now();
    for task in graph.topological_order().unwrap() {
        invoker.invoke(&ToolCall::new(task)).await.unwrap();
    }
    let sequential = sequential_start.elapsed();

    let mut orch = RequestOrchestrator::new();
    let parallel_start = Instant::now();
    let provider = &invoker;
    orch.execute_dag(&graph, move |task| async move {
        provider.invoke(&ToolCall::new(task)).await
    })
    .await
    .unwrap();
    let parallel = parallel_start.elapsed();

    let metrics = OptimizationMetrics::new("dag", sequential.as_secs_f64(), parallel.as_secs_f64())
        .with_throughput_gain(sequential.as_secs_f64() / parallel.as_secs_f64());
    assert!(metrics.improvement_pct > 20.0);
    assert!(metrics.throughput_gain > 1.2);

    let result = BenchmarkResult::new("orchestration", parallel)
        .with_metric("improvement_pct", metrics.improvement_pct)
        .with_metadata("waves", orch.total_batches());
    assert_eq!(result.metadata["waves"], 3);

    let summary = LatencySummary::from_samples(&[sequential.as_secs_f64(), parallel.as_secs_f64()]);
    assert_eq!(summary.count, 2);
    assert!(summary.max >= summary.min);
}
