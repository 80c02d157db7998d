//! Engine metrics for permission checks and mutations

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum latency samples kept for the rolling figures
const MAX_SAMPLES: usize = 10_000;

/// Engine counters and latency figures
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineMetrics {
    /// Permission checks answered
    pub total_checks: u64,

    /// Checks that allowed
    pub allowed_checks: u64,

    /// Checks that denied
    pub denied_checks: u64,

    /// Cache hits
    pub cache_hits: u64,

    /// Cache misses
    pub cache_misses: u64,

    /// Mutations published
    pub mutations_applied: u64,

    /// Mutations rejected by validation or storage
    pub mutations_rejected: u64,

    /// Rolling average check latency
    pub avg_latency_ms: f64,

    /// Rolling p50 check latency
    pub latency_p50_ms: f64,

    /// Rolling p99 check latency
    pub latency_p99_ms: f64,
}

impl EngineMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            self.allowed_checks as f64 / self.total_checks as f64
        }
    }
}

/// Metrics collector
///
/// Counters update in place. Latency samples go into a bounded window in arrival order;
/// the average and percentiles are computed from it when metrics are read.
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,
    latency_samples: Arc<RwLock<VecDeque<f64>>>,
    window: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::with_window(MAX_SAMPLES)
    }

    /// Create a collector keeping at most `window` latency samples
    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(VecDeque::with_capacity(window.min(1_024)))),
            window,
        }
    }

    /// Record a cache hit
    pub async fn record_cache_hit(&self) {
        self.metrics.write().await.cache_hits += 1;
    }

    /// Record a cache miss
    pub async fn record_cache_miss(&self) {
        self.metrics.write().await.cache_misses += 1;
    }

    /// Record a permission check outcome
    pub async fn record_check(&self, allowed: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.total_checks += 1;
        if allowed {
            metrics.allowed_checks += 1;
        } else {
            metrics.denied_checks += 1;
        }
    }

    /// Record a published mutation
    pub async fn record_mutation(&self) {
        self.metrics.write().await.mutations_applied += 1;
    }

    /// Record a rejected mutation
    pub async fn record_rejection(&self) {
        self.metrics.write().await.mutations_rejected += 1;
    }

    /// Record check latency
    pub async fn record_latency(&self, latency: Duration) {
        let mut samples = self.latency_samples.write().await;
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(latency.as_secs_f64() * 1000.0);
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> EngineMetrics {
        let mut metrics = self.metrics.read().await.clone();

        let mut sorted: Vec<f64> = self.latency_samples.read().await.iter().copied().collect();
        if !sorted.is_empty() {
            sorted.sort_by(|a, b| a.total_cmp(b));
            metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
            metrics.latency_p50_ms = percentile(&sorted, 0.50);
            metrics.latency_p99_ms = percentile(&sorted, 0.99);
        }

        metrics
    }

    /// Reset all metrics
    pub async fn reset(&self) {
        *self.metrics.write().await = EngineMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics().await;

        format!(
            r#"# HELP rbac_checks_total Permission checks answered
# TYPE rbac_checks_total counter
rbac_checks_total {}

# HELP rbac_allowed_total Checks that allowed
# TYPE rbac_allowed_total counter
rbac_allowed_total {}

# HELP rbac_denied_total Checks that denied
# TYPE rbac_denied_total counter
rbac_denied_total {}

# HELP rbac_cache_hits_total Cache hits
# TYPE rbac_cache_hits_total counter
rbac_cache_hits_total {}

# HELP rbac_cache_misses_total Cache misses
# TYPE rbac_cache_misses_total counter
rbac_cache_misses_total {}

# HELP rbac_mutations_total Mutations by outcome
# TYPE rbac_mutations_total counter
rbac_mutations_total{{outcome="applied"}} {}
rbac_mutations_total{{outcome="rejected"}} {}

# HELP rbac_check_latency_seconds Check latency
# TYPE rbac_check_latency_seconds summary
rbac_check_latency_seconds{{quantile="0.5"}} {}
rbac_check_latency_seconds{{quantile="0.99"}} {}
"#,
            metrics.total_checks,
            metrics.allowed_checks,
            metrics.denied_checks,
            metrics.cache_hits,
            metrics.cache_misses,
            metrics.mutations_applied,
            metrics.mutations_rejected,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
        )
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank percentile of sorted samples
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() as f64) * p).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_counters() {
        let collector = MetricsCollector::new();
        collector.record_check(true).await;
        collector.record_check(true).await;
        collector.record_check(false).await;
        collector.record_cache_hit().await;
        collector.record_cache_miss().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_checks, 3);
        assert_eq!(metrics.allowed_checks, 2);
        assert_eq!(metrics.denied_checks, 1);
        assert!((metrics.allow_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.cache_hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_latency_figures() {
        let collector = MetricsCollector::new();
        for ms in 1..=100 {
            collector.record_latency(Duration::from_millis(ms)).await;
        }

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 50.5).abs() < 0.01);
        assert!((metrics.latency_p50_ms - 50.0).abs() < 0.01);
        assert!((metrics.latency_p99_ms - 99.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_recording_keeps_arrival_order() {
        let collector = MetricsCollector::new();
        for ms in [30, 10, 20] {
            collector.record_latency(Duration::from_millis(ms)).await;
        }

        let window: Vec<f64> = collector.latency_samples.read().await.iter().copied().collect();
        assert_eq!(window, vec![30.0, 10.0, 20.0]);

        // figures are derived on read
        let metrics = collector.get_metrics().await;
        assert!((metrics.latency_p50_ms - 20.0).abs() < 0.01);
        assert!((metrics.avg_latency_ms - 20.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_window_is_bounded() {
        let collector = MetricsCollector::with_window(4);
        for ms in 1..=10 {
            collector.record_latency(Duration::from_millis(ms)).await;
        }

        let window: Vec<f64> = collector.latency_samples.read().await.iter().copied().collect();
        assert_eq!(window, vec![7.0, 8.0, 9.0, 10.0]);
        assert!((collector.get_metrics().await.avg_latency_ms - 8.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mutations_and_reset() {
        let collector = MetricsCollector::new();
        collector.record_mutation().await;
        collector.record_rejection().await;
        collector.record_rejection().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.mutations_applied, 1);
        assert_eq!(metrics.mutations_rejected, 2);

        let text = collector.export_prometheus().await;
        assert!(text.contains(r#"rbac_mutations_total{outcome="rejected"} 2"#));

        collector.reset().await;
        assert_eq!(collector.get_metrics().await, EngineMetrics::default());
    }

    #[test]
    fn test_percentile_edges() {
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(percentile(&[3.0], 0.99), 3.0);
    }
}
