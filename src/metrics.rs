//! Request metrics and periodic reporting for the classification service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept for percentile estimates
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector shared by all request handlers
pub struct ServiceMetrics {
    /// Total `/predict` requests
    pub requests: AtomicU64,
    /// Requests answered with a prediction
    pub successes: AtomicU64,
    /// Failures keyed by error kind
    failures_by_kind: RwLock<BTreeMap<String, u64>>,
    /// Successful request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// How often each label ranked first
    top1_counts: RwLock<BTreeMap<String, u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures_by_kind: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            top1_counts: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction
    pub fn record_success(&self, latency: Duration, top_label: Option<&str>) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }

        if let Some(label) = top_label {
            if let Ok(mut counts) = self.top1_counts.write() {
                *counts.entry(label.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, kind: &str) {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Total failures across kinds
    pub fn failures(&self) -> u64 {
        self.failures_by_kind
            .read()
            .map(|by_kind| by_kind.values().sum())
            .unwrap_or(0)
    }

    /// Failures keyed by kind
    pub fn get_failures_by_kind(&self) -> BTreeMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Top-1 label histogram
    pub fn get_top1_distribution(&self) -> BTreeMap<String, u64> {
        self.top1_counts
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Latency statistics over the retained window
    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return LatencyStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures();
        let latency = self.get_latency_stats();

        info!(
            requests = requests,
            successes = successes,
            failures = failures,
            throughput = format!("{:.2} req/s", self.get_throughput()),
            "Service metrics summary"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Prediction latency"
        );

        for (kind, count) in self.get_failures_by_kind() {
            info!(kind = %kind, count = count, "Failures");
        }

        let distribution = self.get_top1_distribution();
        for (label, count) in &distribution {
            let pct = if successes > 0 {
                (*count as f64 / successes as f64) * 100.0
            } else {
                0.0
            };
            info!(label = %label, count = *count, "Top-1 share {:.1}%", pct);
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Logs a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: std::sync::Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task. Returns immediately when the
    /// interval is zero.
    pub async fn start(self) {
        if self.interval_secs == 0 {
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new();

        metrics.record_success(Duration::from_micros(100), Some("0"));
        metrics.record_success(Duration::from_micros(300), Some("2"));
        metrics.record_success(Duration::from_micros(200), Some("2"));
        metrics.record_failure("processing");
        metrics.record_failure("model_unavailable");

        assert_eq!(metrics.requests.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.successes.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.failures(), 2);
        assert_eq!(metrics.get_top1_distribution().get("2"), Some(&2));
        assert_eq!(metrics.get_failures_by_kind().get("processing"), Some(&1));
    }

    #[test]
    fn test_latency_stats() {
        let metrics = ServiceMetrics::new();
        for us in 1..=100 {
            metrics.record_success(Duration::from_micros(us), None);
        }

        let stats = metrics.get_latency_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.mean_us, 50);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.max_us, 100);
    }

    #[test]
    fn test_empty_stats() {
        let metrics = ServiceMetrics::new();
        assert_eq!(metrics.get_latency_stats().count, 0);
        assert_eq!(metrics.failures(), 0);
    }

    #[tokio::test]
    async fn test_reporter_disabled() {
        let reporter = MetricsReporter::new(std::sync::Arc::new(ServiceMetrics::new()), 0);
        reporter.start().await;
    }
}
