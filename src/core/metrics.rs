use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Operation metrics collected per backend connection.
pub trait StoreMetrics: Send + Sync {
    /// Record a completed operation with its latency.
    fn record_operation(&self, success: bool, latency: Duration);

    /// Record a read that found the key.
    fn record_hit(&self);

    /// Record a read that reported the key as absent.
    fn record_miss(&self);

    /// Record a connection attempt.
    fn record_connection_attempt(&self);

    /// Record a connection failure.
    fn record_connection_failure(&self);

    /// Get current metrics snapshot.
    fn snapshot(&self) -> MetricsSnapshot;

    /// Reset all metrics (useful for testing).
    fn reset(&self);

    /// Endpoint these metrics belong to.
    fn endpoint_name(&self) -> &str;
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub endpoint: String,
    pub total_operations: u64,
    pub failed_operations: u64,
    pub hits: u64,
    pub misses: u64,
    pub connection_attempts: u64,
    pub connection_failures: u64,
    pub average_latency_ms: f64,
    pub success_rate: f64,
}

/// Thread-safe implementation of [`StoreMetrics`].
#[derive(Debug)]
pub struct AtomicStoreMetrics {
    endpoint: String,

    total_operations: AtomicU64,
    failed_operations: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    connection_attempts: AtomicU64,
    connection_failures: AtomicU64,

    // Operations here are request/response; a running mean is enough, no
    // percentile ring buffer.
    latency: Mutex<LatencyMean>,
}

#[derive(Debug, Default)]
struct LatencyMean {
    samples: u64,
    total_ms: f64,
}

impl AtomicStoreMetrics {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            total_operations: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            connection_attempts: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            latency: Mutex::new(LatencyMean::default()),
        }
    }

    /// Time an operation future and record its outcome.
    pub async fn measure<T, E>(
        &self,
        operation: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<T, E> {
        let start = Instant::now();
        let result = operation.await;
        self.record_operation(result.is_ok(), start.elapsed());
        result
    }
}

impl StoreMetrics for AtomicStoreMetrics {
    fn record_operation(&self, success: bool, latency: Duration) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_operations.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut mean) = self.latency.lock() {
            mean.samples += 1;
            mean.total_ms += latency.as_secs_f64() * 1000.0;
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_operations.load(Ordering::Relaxed);
        let failed = self.failed_operations.load(Ordering::Relaxed);

        let success_rate = if total > 0 {
            ((total - failed) as f64) / (total as f64) * 100.0
        } else {
            0.0
        };

        let average_latency_ms = self
            .latency
            .lock()
            .map(|mean| {
                if mean.samples > 0 {
                    mean.total_ms / mean.samples as f64
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0);

        MetricsSnapshot {
            endpoint: self.endpoint.clone(),
            total_operations: total,
            failed_operations: failed,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            average_latency_ms,
            success_rate,
        }
    }

    fn reset(&self) {
        self.total_operations.store(0, Ordering::Relaxed);
        self.failed_operations.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.connection_attempts.store(0, Ordering::Relaxed);
        self.connection_failures.store(0, Ordering::Relaxed);
        if let Ok(mut mean) = self.latency.lock() {
            *mean = LatencyMean::default();
        }
    }

    fn endpoint_name(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_metrics_basic() {
        let metrics = AtomicStoreMetrics::new("redis://127.0.0.1:6379".to_string());

        metrics.record_operation(true, Duration::from_millis(10));
        metrics.record_operation(true, Duration::from_millis(20));
        metrics.record_operation(false, Duration::from_millis(30));
        metrics.record_hit();
        metrics.record_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.endpoint, "redis://127.0.0.1:6379");
        assert_eq!(snapshot.total_operations, 3);
        assert_eq!(snapshot.failed_operations, 1);
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert!((snapshot.average_latency_ms - 20.0).abs() < 0.5);
        assert!((snapshot.success_rate - 66.6).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_measure_records_failures() {
        let metrics = AtomicStoreMetrics::new("test".to_string());

        let ok: Result<u32, ()> = metrics.measure(async { Ok(1) }).await;
        assert_eq!(ok, Ok(1));
        let err: Result<u32, ()> = metrics.measure(async { Err(()) }).await;
        assert!(err.is_err());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_operations, 2);
        assert_eq!(snapshot.failed_operations, 1);
    }

    #[test]
    fn test_reset_clears_counters() {
        let metrics = AtomicStoreMetrics::new("test".to_string());
        metrics.record_operation(true, Duration::from_millis(5));
        metrics.record_connection_attempt();
        metrics.record_connection_failure();
        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_operations, 0);
        assert_eq!(snapshot.connection_attempts, 0);
        assert_eq!(snapshot.connection_failures, 0);
        assert_eq!(snapshot.average_latency_ms, 0.0);
    }
}
