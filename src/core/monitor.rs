//! Sliding-window latency monitor with regression detection.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::DEFAULT_REGRESSION_FACTOR;
use crate::olog_warn;

/// Arithmetic mean, or 0 for an empty slice.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// 95th percentile by nearest rank: `sorted[floor(0.95 * n)]`, or 0 when empty.
pub fn p95(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let idx = ((0.95 * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Serializable view of the monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub samples: usize,
    pub window: usize,
    pub mean_latency: f64,
    pub p95_latency: f64,
    pub regression: bool,
    pub regression_events: u64,
}

/// Records latency samples (seconds) and compares the two most recent windows.
///
/// At most `2 * window` samples are retained; older ones are dropped in
/// insertion order. A warning is logged by [`PerformanceMonitor::record`]
/// each time the monitor enters a regressed state.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    window: usize,
    factor: f64,
    samples: Vec<f64>,
    regressed: bool,
    regression_events: u64,
}

impl PerformanceMonitor {
    /// Monitor with the default 20% regression threshold. A zero window is clamped to 1.
    pub fn new(window: usize) -> Self {
        Self::with_factor(window, DEFAULT_REGRESSION_FACTOR)
    }

    /// A non-finite factor falls back to the default; anything below 1.0 is raised to 1.0.
    pub fn with_factor(window: usize, factor: f64) -> Self {
        let window = window.max(1);
        let factor = if factor.is_finite() {
            factor.max(1.0)
        } else {
            DEFAULT_REGRESSION_FACTOR
        };
        Self {
            window,
            factor,
            samples: Vec::with_capacity(window * 2 + 1),
            regressed: false,
            regression_events: 0,
        }
    }

    pub fn record(&mut self, latency: f64) {
        self.samples.push(latency);
        let limit = self.window * 2;
        if self.samples.len() > limit {
            let excess = self.samples.len() - limit;
            self.samples.drain(..excess);
        }

        let regressed = match self.window_means() {
            Some((old_mean, new_mean)) => {
                let regressed = new_mean > old_mean * self.factor;
                if regressed && !self.regressed {
                    self.regression_events += 1;
                    olog_warn!(
                        "Latency regression: window mean {:.4}s vs previous {:.4}s (factor {})",
                        new_mean,
                        old_mean,
                        self.factor
                    );
                }
                regressed
            }
            None => false,
        };
        self.regressed = regressed;
    }

    pub fn record_duration(&mut self, latency: Duration) {
        self.record(latency.as_secs_f64());
    }

    /// Mean over every retained sample.
    pub fn mean_latency(&self) -> f64 {
        mean(&self.samples)
    }

    /// p95 over every retained sample.
    pub fn p95_latency(&self) -> f64 {
        p95(&self.samples)
    }

    /// True when the newest window's mean is strictly greater than the
    /// preceding window's mean times the regression factor.
    ///
    /// Always false until `2 * window` samples have been recorded.
    pub fn regression_detected(&self) -> bool {
        self.window_means()
            .is_some_and(|(old_mean, new_mean)| new_mean > old_mean * self.factor)
    }

    /// Times the monitor went from healthy to regressed while recording.
    pub fn regression_events(&self) -> u64 {
        self.regression_events
    }

    /// Means of the previous and the newest window, once both are full.
    fn window_means(&self) -> Option<(f64, f64)> {
        if self.samples.len() < self.window * 2 {
            return None;
        }
        let split = self.samples.len() - self.window;
        let old = &self.samples[split - self.window..split];
        let new = &self.samples[split..];
        Some((mean(old), mean(new)))
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn regression_factor(&self) -> f64 {
        self.factor
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            samples: self.samples.len(),
            window: self.window,
            mean_latency: self.mean_latency(),
            p95_latency: self.p95_latency(),
            regression: self.regression_detected(),
            regression_events: self.regression_events,
        }
    }
}
