use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    answered: AtomicUsize,
    refused: AtomicUsize,
    failed_requests: AtomicUsize,
    timeouts: AtomicUsize,

    // Timing (in microseconds)
    total_query_time_us: AtomicU64,

    // Per-label counts
    routes: DashMap<String, usize>,
    errors: DashMap<String, usize>,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            answered: AtomicUsize::new(0),
            refused: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            timeouts: AtomicUsize::new(0),
            total_query_time_us: AtomicU64::new(0),
            routes: DashMap::new(),
            errors: DashMap::new(),
        })
    }

    pub fn record_answer(&self, route: &str, refused: bool, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if refused {
            self.refused.fetch_add(1, Ordering::Relaxed);
        } else {
            self.answered.fetch_add(1, Ordering::Relaxed);
        }
        *self.routes.entry(route.to_string()).or_insert(0) += 1;
    }

    pub fn record_failure(&self, code: &str, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if code == "timeout" {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        *self.errors.entry(code.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self, tenants_cached: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            answered: self.answered.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            avg_query_time_ms: self.avg_time_ms(&self.total_query_time_us, &self.total_requests),
            routes: collect(&self.routes),
            errors: collect(&self.errors),
            tenants_cached,
        }
    }

    fn avg_time_ms(&self, total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
        let total = total_us.load(Ordering::Relaxed) as f64;
        let cnt = count.load(Ordering::Relaxed) as f64;
        if cnt > 0.0 {
            total / cnt / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

fn collect(counts: &DashMap<String, usize>) -> BTreeMap<String, usize> {
    counts
        .iter()
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub answered: usize,
    pub refused: usize,
    pub failed_requests: usize,
    pub timeouts: usize,
    pub avg_query_time_ms: f64,
    pub routes: BTreeMap<String, usize>,
    pub errors: BTreeMap<String, usize>,
    pub tenants_cached: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.record_answer("local", false, Duration::from_millis(10));
        metrics.record_answer("local", true, Duration::from_millis(20));
        metrics.record_answer("global", false, Duration::from_millis(30));
        metrics.record_failure("timeout", Duration::from_millis(40));

        let snapshot = metrics.snapshot(2);

        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.answered, 2);
        assert_eq!(snapshot.refused, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.routes.get("local"), Some(&2));
        assert_eq!(snapshot.errors.get("timeout"), Some(&1));
        assert!((snapshot.avg_query_time_ms - 25.0).abs() < 1e-9);
        assert_eq!(snapshot.tenants_cached, 2);
    }

    #[test]
    fn test_empty_average_is_zero() {
        assert_eq!(Metrics::new().snapshot(0).avg_query_time_ms, 0.0);
    }
}
