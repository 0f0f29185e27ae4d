//! Capability invocation boundary.
//!
//! Everything the optimization primitives sit in front of is reached through
//! [`Invoker`]: a tool name plus JSON arguments in, a JSON value or a
//! human-readable failure out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::{olog_trace, Error, Result};

/// A single tool invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Something that can execute tool calls.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Run a call. Failures are reported as [`Error::Tool`].
    async fn invoke(&self, call: &ToolCall) -> Result<Value>;
}

/// Stand-in provider with repeatable latency.
///
/// Each tool sleeps for `base + jitter`, where the jitter is derived from a
/// hash of the tool name and lies in `[0, jitter)`. Tools listed with
/// [`SimulatedInvoker::fail_on`] always fail.
#[derive(Debug)]
pub struct SimulatedInvoker {
    base: Duration,
    jitter: Duration,
    failing: HashSet<String>,
    calls: AtomicU64,
}

impl Default for SimulatedInvoker {
    fn default() -> Self {
        Self::new(Duration::from_millis(20), Duration::from_millis(40))
    }
}

impl SimulatedInvoker {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self {
            base,
            jitter,
            failing: HashSet::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Make every call to `tool` fail.
    pub fn fail_on(mut self, tool: impl Into<String>) -> Self {
        self.failing.insert(tool.into());
        self
    }

    /// The latency this invoker will simulate for `tool`.
    pub fn latency_for(&self, tool: &str) -> Duration {
        let jitter_nanos = self.jitter.as_nanos() as u64;
        if jitter_nanos == 0 {
            return self.base;
        }
        let mut hasher = DefaultHasher::new();
        tool.hash(&mut hasher);
        self.base + Duration::from_nanos(hasher.finish() % jitter_nanos)
    }

    /// Number of calls received so far, failed ones included.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Invoker for SimulatedInvoker {
    async fn invoke(&self, call: &ToolCall) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let latency = self.latency_for(&call.name);
        olog_trace!("SimulatedInvoker::invoke tool={} latency={:?}", call.name, latency);
        tokio::time::sleep(latency).await;

        if self.failing.contains(&call.name) {
            return Err(Error::Tool {
                name: call.name.clone(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(json!({
            "tool": call.name,
            "latency": latency.as_secs_f64(),
            "ok": true,
            "arguments": Value::Object(call.arguments.clone()),
        }))
    }
}
