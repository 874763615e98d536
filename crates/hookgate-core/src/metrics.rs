//! Process-local rolling metrics for stage executions.
//!
//! Samples live in a bounded ring buffer; aggregates are recomputed from the
//! buffer after every append. Call [`MetricsTracker::flush`] to emit the
//! current aggregates as a single `tracing::info!` event.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stage::HookStage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSample {
    pub stage: HookStage,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub samples: usize,
    pub window: usize,
    pub average_duration_ms: f64,
    pub success_rate: f64,
    pub last: Option<MetricSample>,
}

#[derive(Debug, Clone)]
pub struct MetricsTracker {
    window: usize,
    samples: VecDeque<MetricSample>,
    average_duration_ms: f64,
    success_rate: f64,
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(50)
    }
}

impl MetricsTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            average_duration_ms: 0.0,
            success_rate: 1.0,
        }
    }

    /// Append a sample, evicting the oldest when the window is full.
    pub fn record(&mut self, stage: HookStage, duration_ms: u64, success: bool) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(MetricSample {
            stage,
            timestamp: Utc::now(),
            duration_ms,
            success,
        });
        self.recompute();
        tracing::trace!(metric = "stage_sample", stage = %stage, duration_ms, success);
    }

    fn recompute(&mut self) {
        let n = self.samples.len();
        if n == 0 {
            self.average_duration_ms = 0.0;
            self.success_rate = 1.0;
            return;
        }
        let total: u64 = self.samples.iter().map(|s| s.duration_ms).sum();
        let ok = self.samples.iter().filter(|s| s.success).count();
        self.average_duration_ms = total as f64 / n as f64;
        self.success_rate = ok as f64 / n as f64;
    }

    pub fn average_duration_ms(&self) -> f64 {
        self.average_duration_ms
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    /// Average duration of the samples for one stage.
    pub fn stage_average_ms(&self, stage: HookStage) -> Option<f64> {
        let durations: Vec<u64> = self
            .samples
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.duration_ms)
            .collect();
        if durations.is_empty() {
            return None;
        }
        Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64)
    }

    /// Whether `duration_ms` exceeded `budget_ms`.
    pub fn exceeded_budget(duration_ms: u64, budget_ms: u64) -> bool {
        budget_ms > 0 && duration_ms > budget_ms
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            samples: self.samples.len(),
            window: self.window,
            average_duration_ms: self.average_duration_ms,
            success_rate: self.success_rate,
            last: self.samples.back().cloned(),
        }
    }

    /// Emit current aggregates as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            samples = self.samples.len(),
            average_duration_ms = self.average_duration_ms,
            success_rate = self.success_rate,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_recomputed_after_each_append() {
        let mut m = MetricsTracker::new(10);
        assert_eq!(m.success_rate(), 1.0);
        m.record(HookStage::PreCommit, 100, true);
        m.record(HookStage::PreCommit, 300, false);
        assert_eq!(m.average_duration_ms(), 200.0);
        assert_eq!(m.success_rate(), 0.5);
    }

    #[test]
    fn window_evicts_oldest() {
        let mut m = MetricsTracker::new(2);
        m.record(HookStage::PreCommit, 1000, false);
        m.record(HookStage::PrePush, 10, true);
        m.record(HookStage::PrePush, 30, true);
        assert_eq!(m.len(), 2);
        assert_eq!(m.average_duration_ms(), 20.0);
        assert_eq!(m.success_rate(), 1.0);
        assert_eq!(m.stage_average_ms(HookStage::PreCommit), None);
        assert_eq!(m.stage_average_ms(HookStage::PrePush), Some(20.0));
    }

    #[test]
    fn budget_check() {
        assert!(MetricsTracker::exceeded_budget(31_000, 30_000));
        assert!(!MetricsTracker::exceeded_budget(30_000, 30_000));
        assert!(!MetricsTracker::exceeded_budget(99_999, 0));
    }
}
