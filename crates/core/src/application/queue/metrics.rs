// Queue Metrics
//
// Throughput and processing time come from a sliding window of recent
// completions; error rate and counters are cumulative for the process
// lifetime.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Snapshot of queue metrics handed to callers and alert rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub size: usize,
    /// size / max_queue_size, 0.0..=1.0
    pub queue_utilization: f64,
    /// Completions per second over the sliding window
    pub throughput: f64,
    /// failed / (completed + failed); 0.0 before any outcome
    pub error_rate: f64,
    pub average_processing_time_ms: f64,
    /// Estimated serialized size of all retained items
    pub memory_usage_bytes: usize,
    pub completed_total: u64,
    pub failed_total: u64,
    pub in_flight: usize,
}

/// Sliding-window completion tracker
pub struct MetricsWindow {
    /// (finished_at epoch ms, processing duration ms)
    samples: VecDeque<(i64, i64)>,
    window_ms: i64,
    pub completed_total: u64,
    pub failed_total: u64,
}

impl MetricsWindow {
    pub fn new(window_ms: i64) -> Self {
        Self {
            samples: VecDeque::new(),
            window_ms,
            completed_total: 0,
            failed_total: 0,
        }
    }

    /// Record one completion and prune samples older than the window
    pub fn record_completion(&mut self, finished_at: i64, duration_ms: i64) {
        self.completed_total += 1;
        self.samples.push_back((finished_at, duration_ms));
        self.prune(finished_at);
    }

    pub fn record_failure(&mut self) {
        self.failed_total += 1;
    }

    fn prune(&mut self, now: i64) {
        let cutoff = now - self.window_ms;
        while let Some(&(ts, _)) = self.samples.front() {
            if ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Completions per second over the window
    pub fn throughput(&mut self, now: i64) -> f64 {
        self.prune(now);
        self.samples.len() as f64 / (self.window_ms as f64 / 1_000.0)
    }

    /// Mean processing duration of windowed completions
    pub fn average_processing_time_ms(&mut self, now: i64) -> f64 {
        self.prune(now);
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: i64 = self.samples.iter().map(|(_, d)| d).sum();
        total as f64 / self.samples.len() as f64
    }

    pub fn error_rate(&self) -> f64 {
        let outcomes = self.completed_total + self.failed_total;
        if outcomes == 0 {
            return 0.0;
        }
        self.failed_total as f64 / outcomes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_over_window() {
        let mut window = MetricsWindow::new(10_000);
        window.record_completion(1_000, 100);
        window.record_completion(2_000, 100);
        window.record_completion(3_000, 100);

        // 3 completions over a 10s window
        assert!((window.throughput(3_000) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_old_samples_pruned() {
        let mut window = MetricsWindow::new(10_000);
        window.record_completion(1_000, 100);
        window.record_completion(20_000, 300);

        // The first sample fell out of the window
        assert!((window.average_processing_time_ms(20_000) - 300.0).abs() < 1e-9);
        assert_eq!(window.completed_total, 2);
    }

    #[test]
    fn test_error_rate() {
        let mut window = MetricsWindow::new(10_000);
        assert_eq!(window.error_rate(), 0.0);

        window.record_completion(1_000, 100);
        window.record_completion(2_000, 100);
        window.record_completion(3_000, 100);
        window.record_failure();

        assert!((window.error_rate() - 0.25).abs() < 1e-9);
    }
}
