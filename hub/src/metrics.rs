//! Hub metrics for monitoring operations.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Metrics for hub operations.
pub struct HubMetrics {
    // Call metrics
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    retried_calls: AtomicU64,
    active_executions: AtomicU64,

    // Connection metrics
    connection_errors: AtomicU64,
    reconnect_attempts: AtomicU64,

    // Event metrics
    events_published: AtomicU64,
    subscribers_evicted: AtomicU64,

    // Per-tool latency tracking, keyed "server:tool"
    tool_latencies: DashMap<String, LatencyStats>,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            retried_calls: AtomicU64::new(0),
            active_executions: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            subscribers_evicted: AtomicU64::new(0),
            tool_latencies: DashMap::new(),
        }
    }

    pub fn record_call_start(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.active_executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_end(&self, server: &str, tool: &str, success: bool, duration_ms: u64) {
        self.active_executions.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.tool_latencies
            .entry(format!("{server}:{tool}"))
            .or_insert_with(LatencyStats::new)
            .record(duration_ms);
    }

    pub fn record_retry(&self) {
        self.retried_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscriber_evicted(&self) {
        self.subscribers_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            retried_calls: self.retried_calls.load(Ordering::Relaxed),
            active_executions: self.active_executions.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            subscribers_evicted: self.subscribers_evicted.load(Ordering::Relaxed),
        }
    }

    /// Latency stats for a specific tool, keyed "server:tool".
    pub fn tool_latency(&self, key: &str) -> Option<LatencySnapshot> {
        self.tool_latencies.get(key).map(|stats| stats.snapshot())
    }

    pub fn all_tool_latencies(&self) -> Vec<(String, LatencySnapshot)> {
        self.tool_latencies
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Running latency aggregate for one tool.
pub struct LatencyStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyStats {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, duration_ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.min_ms.fetch_min(duration_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(duration_ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        LatencySnapshot {
            count,
            avg_ms: if count == 0 { 0 } else { total / count },
            min_ms: match self.min_ms.load(Ordering::Relaxed) {
                u64::MAX => 0,
                v => v,
            },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub retried_calls: u64,
    pub active_executions: u64,
    pub connection_errors: u64,
    pub reconnect_attempts: u64,
    pub events_published: u64,
    pub subscribers_evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_lifecycle_counters() {
        let metrics = HubMetrics::new();
        metrics.record_call_start();
        metrics.record_call_end("math", "add", true, 12);
        metrics.record_call_start();
        metrics.record_call_end("math", "add", false, 40);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls, 2);
        assert_eq!(snapshot.successful_calls, 1);
        assert_eq!(snapshot.failed_calls, 1);
        assert_eq!(snapshot.active_executions, 0);

        let latency = metrics.tool_latency("math:add").unwrap();
        assert_eq!(latency.count, 2);
        assert_eq!(latency.min_ms, 12);
        assert_eq!(latency.max_ms, 40);
        assert_eq!(latency.avg_ms, 26);
    }

    #[test]
    fn test_empty_latency_is_absent() {
        let metrics = HubMetrics::new();
        assert!(metrics.tool_latency("math:add").is_none());
    }
}
