use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use mcpopt::benchmark::{LatencySummary, OptimizationMetrics};
use mcpopt::config::Config;
use mcpopt::core::{Context, LoadBalancer, PerformanceMonitor};
use mcpopt::invoke::{Invoker, SimulatedInvoker, ToolCall};
use mcpopt::orchestration::{OrchestratorEvent, RequestOrchestrator, ToolPlan};
use mcpopt::util::timed;
use mcpopt::{olog, Result};

/// mcpopt - optimization primitives for capability-provider calls
#[derive(Parser, Debug)]
#[command(name = "mcpopt")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    MCPOPT_DEBUG=1        Enable debug logging (alternative to --debug)\n    MCPOPT_LOG=<level>    Set the log level explicitly")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.mcpopt/mcpopt.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.mcpopt/mcpopt.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the optimization demonstrations against a simulated provider
    Demo {
        #[arg(value_enum, default_value_t = Scenario::All)]
        scenario: Scenario,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Cache,
    Balance,
    Orchestrate,
    Monitor,
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    mcpopt::log::init(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Demo { scenario } => {
            olog!("Demo starting: scenario={:?}", scenario);
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            rt.block_on(run_demo(scenario, &config))
        }
    }
}

async fn run_demo(scenario: Scenario, config: &Config) -> Result<()> {
    let invoker = SimulatedInvoker::default();

    println!("{}", "=".repeat(60));
    println!("MCP Optimization Strategies - Demonstrations");
    println!("{}", "=".repeat(60));

    let all = scenario == Scenario::All;
    if all || scenario == Scenario::Cache {
        demo_caching(config, &invoker).await?;
    }
    if all || scenario == Scenario::Balance {
        demo_load_balancing(config).await;
    }
    if all || scenario == Scenario::Orchestrate {
        demo_orchestration(&invoker).await?;
    }
    if all || scenario == Scenario::Monitor {
        demo_monitoring(config);
    }

    println!();
    println!("{}", "=".repeat(60));
    println!("All optimization demos completed.");
    Ok(())
}

fn context(pairs: &[(&str, &str)]) -> Context {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}

async fn demo_caching(config: &Config, invoker: &SimulatedInvoker) -> Result<()> {
    println!("\n--- Context-Aware Caching Demo ---");
    let mut cache = config.build_cache::<Value>();
    let contexts = [
        context(&[("user", "alice"), ("role", "admin")]),
        context(&[("user", "bob"), ("role", "viewer")]),
    ];
    let queries = ["search:logs", "search:metrics", "search:logs"];

    let mut baseline = Duration::ZERO;
    let (outcome, elapsed) = timed(async {
        for ctx in &contexts {
            for query in queries {
                baseline += invoker.latency_for(query);
                if cache.get(query, ctx).is_some() {
                    continue;
                }
                let call = ToolCall::new(query).with_argument("context", Value::Object(ctx.clone()));
                let value = invoker.invoke(&call).await?;
                cache.put(query, ctx, value);
            }
        }
        Ok::<_, mcpopt::Error>(())
    })
    .await;
    outcome?;

    let metrics = OptimizationMetrics::new("context_cache", baseline.as_secs_f64(), elapsed.as_secs_f64())
        .with_cache_hit_rate(cache.hit_rate());
    println!("  Cache hit rate : {:.0}%", cache.hit_rate() * 100.0);
    println!("  Hits / misses  : {} / {}", cache.hits(), cache.misses());
    println!("  Improvement    : {:.1}%", metrics.improvement_pct);
    Ok(())
}

async fn demo_load_balancing(config: &Config) {
    println!("\n--- Capability-Aware Load Balancing Demo ---");
    let mut lb = if config.providers.is_empty() {
        let mut lb = LoadBalancer::new();
        lb.register_server("nlp_server", ["search", "summarize"]);
        lb.register_server("data_server", ["search", "aggregate"]);
        lb.register_server("ml_server", ["classify", "predict"]);
        lb
    } else {
        config.build_balancer()
    };

    let requests: [(&[&str], usize); 3] = [
        (&["search"], 20),
        (&["summarize"], 5),
        (&["classify", "predict"], 8),
    ];
    let mut unrouted = 0;
    for (caps, count) in requests {
        for _ in 0..count {
            match lb.select_server(caps) {
                Some(server) => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    lb.release(&server);
                }
                None => unrouted += 1,
            }
        }
    }

    println!("  Load distribution:");
    for (name, handled) in lb.load_distribution() {
        println!("    {:<12} {}", name, handled);
    }
    if unrouted > 0 {
        println!("  Unrouted requests: {}", unrouted);
    }
}

async fn demo_orchestration(invoker: &SimulatedInvoker) -> Result<()> {
    println!("\n--- Request Orchestration Demo ---");
    let plan = ToolPlan::new()
        .with_step("fetch_docs", ToolCall::new("fetch_docs"), Vec::<String>::new())
        .with_step("fetch_schema", ToolCall::new("fetch_schema"), Vec::<String>::new())
        .with_step("analyze", ToolCall::new("analyze"), ["fetch_docs", "fetch_schema"])
        .with_step("summarize", ToolCall::new("summarize"), ["analyze"]);

    let (tx, mut rx) = mpsc::channel(64);
    let mut orch = RequestOrchestrator::with_events(tx);
    let (results, elapsed) = timed(orch.execute_plan(&plan, invoker)).await;
    let results: HashMap<String, Value> = results?;

    while let Ok(event) = rx.try_recv() {
        if let OrchestratorEvent::WaveStarted { wave, tasks } = event {
            println!("  Wave {}: {}", wave, tasks.join(", "));
        }
    }

    let sequential: Duration = plan
        .graph()
        .task_names()
        .map(|task| invoker.latency_for(task))
        .sum();
    let metrics = OptimizationMetrics::new("dag_orchestration", sequential.as_secs_f64(), elapsed.as_secs_f64());

    println!("  Tasks completed : {}", orch.total_requests());
    println!("  Parallel batches: {}", orch.total_batches());
    let mut tasks: Vec<_> = results.iter().collect();
    tasks.sort_by(|a, b| a.0.cmp(b.0));
    for (task, result) in tasks {
        let latency = result.get("latency").and_then(Value::as_f64).unwrap_or(0.0);
        println!("    {}: latency={:.3}s", task, latency);
    }
    println!(
        "  Sequential {:.3}s vs orchestrated {:.3}s ({:.1}% faster)",
        metrics.baseline_latency, metrics.optimized_latency, metrics.improvement_pct
    );
    Ok(())
}

/// Record a period a quarter longer than the window, so the next period's
/// comparison straddles both.
fn record_period(mon: &mut PerformanceMonitor, base: f64, step: f64) {
    let count = mon.window() + mon.window() / 4;
    for i in 0..count {
        mon.record(base + (i % 10) as f64 * step);
    }
}

fn demo_monitoring(config: &Config) {
    println!("\n--- Performance Monitoring Demo ---");
    let mut mon = config.build_monitor();
    println!("  Window                     : {} samples", mon.window());

    record_period(&mut mon, 0.03, 0.001);
    println!("  Mean after normal period   : {:.4}s", mon.mean_latency());
    println!("  Regression detected?       : {}", mon.regression_detected());

    record_period(&mut mon, 0.06, 0.002);
    println!("  Mean after degraded period : {:.4}s", mon.mean_latency());
    println!("  Regression detected?       : {}", mon.regression_detected());

    let summary = LatencySummary::from_samples(mon.samples());
    println!(
        "  {}",
        json!({"p95": summary.p95, "min": summary.min, "max": summary.max})
    );
}
