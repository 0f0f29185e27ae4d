//! Optimization reporting.
//!
//! Plain result types for describing how much an optimization helped and
//! for scoring benchmark runs. Nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::monitor::{mean, p95};

/// Before/after comparison for one optimization strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    pub strategy_name: String,
    pub baseline_latency: f64,
    pub optimized_latency: f64,
    /// `(baseline - optimized) / baseline * 100`, negative when slower.
    pub improvement_pct: f64,
    #[serde(default)]
    pub cache_hit_rate: f64,
    #[serde(default)]
    pub throughput_gain: f64,
}

impl OptimizationMetrics {
    pub fn new(strategy_name: impl Into<String>, baseline_latency: f64, optimized_latency: f64) -> Self {
        let improvement_pct = if baseline_latency == 0.0 {
            0.0
        } else {
            (baseline_latency - optimized_latency) / baseline_latency * 100.0
        };
        Self {
            strategy_name: strategy_name.into(),
            baseline_latency,
            optimized_latency,
            improvement_pct,
            cache_hit_rate: 0.0,
            throughput_gain: 0.0,
        }
    }

    pub fn with_cache_hit_rate(mut self, rate: f64) -> Self {
        self.cache_hit_rate = rate;
        self
    }

    pub fn with_throughput_gain(mut self, gain: f64) -> Self {
        self.throughput_gain = gain;
        self
    }
}

/// Outcome of a single benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub benchmark_name: String,
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock run time in seconds.
    pub duration_secs: f64,
}

impl BenchmarkResult {
    pub fn new(benchmark_name: impl Into<String>, duration: Duration) -> Self {
        Self {
            benchmark_name: benchmark_name.into(),
            metrics: BTreeMap::new(),
            metadata: Map::new(),
            timestamp: Utc::now(),
            duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Weighted average of the named metrics (higher is better).
    ///
    /// Metrics missing from this result count as 0. Returns 0 when the
    /// weights sum to 0.
    pub fn score(&self, weights: &BTreeMap<String, f64>) -> f64 {
        let total: f64 = weights.values().sum();
        if total == 0.0 {
            return 0.0;
        }
        weights
            .iter()
            .map(|(name, weight)| self.metric(name).unwrap_or(0.0) * weight)
            .sum::<f64>()
            / total
    }
}

/// Mean of per-benchmark scores, or 0 with none.
pub fn overall_score(scores: &BTreeMap<String, f64>) -> f64 {
    let values: Vec<f64> = scores.values().copied().collect();
    mean(&values)
}

/// Summary statistics over latency samples in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencySummary {
    /// All fields are 0 for an empty slice.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        Self {
            count: samples.len(),
            mean: mean(samples),
            p95: p95(samples),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}
