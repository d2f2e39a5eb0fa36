//! Metrics collection and statistics.

use crate::check::CheckCounts;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Collects call-level metrics during load test execution.
///
/// Shared behind a mutex; callers lock it only for the update itself.
pub struct MetricsCollector {
    histogram: Histogram<u64>,
    iterations: u64,
    requests_completed: u64,
    call_failures: u64,
    failures_by_kind: BTreeMap<String, u64>,
    bytes_received: u64,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            // 3 significant figures, auto-resizing; cannot fail.
            histogram: Histogram::new(3).expect("valid histogram precision"),
            iterations: 0,
            requests_completed: 0,
            call_failures: 0,
            failures_by_kind: BTreeMap::new(),
            bytes_received: 0,
        }
    }

    /// Record a call that produced a response, whatever its status.
    pub fn record_response(&mut self, latency: Duration, bytes: usize) {
        self.requests_completed += 1;
        self.bytes_received += bytes as u64;
        self.histogram.saturating_record(latency.as_micros() as u64);
    }

    /// Record a call that failed at the transport level.
    pub fn record_call_failure(&mut self, kind: &str) {
        self.call_failures += 1;
        *self.failures_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Record a finished iteration.
    pub fn record_iteration(&mut self) {
        self.iterations += 1;
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn call_failures(&self) -> u64 {
        self.call_failures
    }

    /// Generate the final report.
    pub fn report(
        &self,
        scenario_name: String,
        vus: u32,
        stopped_vus: usize,
        elapsed: Duration,
        checks: BTreeMap<String, CheckCounts>,
    ) -> TestReport {
        let elapsed_secs = elapsed.as_secs_f64();
        let total_requests = self.requests_completed + self.call_failures;
        let rps = if elapsed_secs > 0.0 {
            total_requests as f64 / elapsed_secs
        } else {
            0.0
        };
        let empty = self.histogram.len() == 0;
        let ms = |us: u64| if empty { 0.0 } else { us as f64 / 1000.0 };

        TestReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario_name,
            vus,
            stopped_vus,
            elapsed_secs,
            checks,
            total_iterations: self.iterations,
            total_requests,
            total_call_failures: self.call_failures,
            call_failures_by_kind: self.failures_by_kind.clone(),
            requests_per_second: rps,
            latency_p50: ms(self.histogram.value_at_percentile(50.0)),
            latency_p90: ms(self.histogram.value_at_percentile(90.0)),
            latency_p95: ms(self.histogram.value_at_percentile(95.0)),
            latency_p99: ms(self.histogram.value_at_percentile(99.0)),
            latency_min: ms(self.histogram.min()),
            latency_max: ms(self.histogram.max()),
            latency_avg: if empty {
                0.0
            } else {
                self.histogram.mean() / 1000.0
            },
            bytes_received: self.bytes_received,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Final test report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub timestamp: String,
    pub scenario_name: String,
    pub vus: u32,
    pub stopped_vus: usize,
    pub elapsed_secs: f64,

    /// Business outcomes: pass/fail per check name.
    pub checks: BTreeMap<String, CheckCounts>,

    pub total_iterations: u64,
    pub total_requests: u64,
    /// Infrastructure outcomes: calls that produced no response.
    pub total_call_failures: u64,
    pub call_failures_by_kind: BTreeMap<String, u64>,
    pub requests_per_second: f64,

    // Request latency percentiles (ms), responses only
    pub latency_p50: f64,
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_min: f64,
    pub latency_max: f64,
    pub latency_avg: f64,

    pub bytes_received: u64,
}

impl TestReport {
    pub fn check_failures(&self) -> u64 {
        self.checks.values().map(|c| c.fail).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_separates_responses_and_failures() {
        let mut m = MetricsCollector::new();
        m.record_response(Duration::from_millis(10), 100);
        m.record_response(Duration::from_millis(30), 50);
        m.record_call_failure("timeout");
        for _ in 0..3 {
            m.record_iteration();
        }

        let report = m.report(
            "t".to_string(),
            1,
            1,
            Duration::from_secs(1),
            BTreeMap::new(),
        );
        assert_eq!(report.total_iterations, 3);
        assert_eq!(report.total_requests, 3);
        assert_eq!(report.total_call_failures, 1);
        assert_eq!(report.call_failures_by_kind.get("timeout"), Some(&1));
        assert_eq!(report.bytes_received, 150);
        assert!((report.requests_per_second - 3.0).abs() < 1e-9);
        assert!(report.latency_min >= 9.9 && report.latency_min <= 10.1);
        assert!(report.latency_max >= 29.9 && report.latency_max <= 30.1);
    }

    #[test]
    fn test_empty_report() {
        let report = MetricsCollector::new().report(
            "empty".to_string(),
            2,
            2,
            Duration::ZERO,
            BTreeMap::new(),
        );
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.requests_per_second, 0.0);
        assert_eq!(report.latency_max, 0.0);
        assert_eq!(report.latency_avg, 0.0);
    }

    #[test]
    fn test_check_failures_sum() {
        let mut checks = BTreeMap::new();
        checks.insert("a".to_string(), CheckCounts { pass: 3, fail: 1 });
        checks.insert("b".to_string(), CheckCounts { pass: 0, fail: 2 });
        let report = MetricsCollector::new().report("t".into(), 1, 1, Duration::ZERO, checks);
        assert_eq!(report.check_failures(), 3);
    }
}
