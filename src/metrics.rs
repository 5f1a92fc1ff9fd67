//! Request counters and the Prometheus exporter.
//!
//! [`RequestMetrics`] holds the in-process counters served by
//! `GET /v1/observability/course/metrics`. Every update is mirrored to the
//! `metrics` facade so the same numbers reach Prometheus when an exporter is
//! installed (`METRICS_PORT > 0`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `http_requests_received_total` - Requests entering the pipeline
//! - `http_responses_sent_total` - Responses leaving it (label: status)
//! - `http_panics_recovered_total` - Handler panics turned into 500s
//! - `http_rate_limited_total` - Requests rejected with 429
//!
//! ## Histograms
//! - `http_request_duration_seconds` - Time spent inside the pipeline
//!
//! ## Gauges
//! - `rate_limiter_tracked_clients` - Client IPs currently held by the limiter

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_RECEIVED_TOTAL: &str = "http_requests_received_total";
    pub const RESPONSES_SENT_TOTAL: &str = "http_responses_sent_total";
    pub const PANICS_RECOVERED_TOTAL: &str = "http_panics_recovered_total";
    pub const RATE_LIMITED_TOTAL: &str = "http_rate_limited_total";
    pub const REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const RATE_LIMITER_TRACKED_CLIENTS: &str = "rate_limiter_tracked_clients";
}

/// Status codes are counted in a flat table indexed by code.
const STATUS_SLOTS: usize = 600;

/// Lock-free request counters.
pub struct RequestMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    by_status: [AtomicU64; STATUS_SLOTS],
}

/// Point-in-time copy of [`RequestMetrics`], serialized by the metrics endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_us: u64,
    /// Status code (as a string key) to count; codes never seen are omitted.
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            processing_time_us: AtomicU64::new(0),
            by_status: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn record_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        counter!(names::REQUESTS_RECEIVED_TOTAL).increment(1);
    }

    /// Count a finished response and the time it took.
    pub fn record_sent(&self, status: u16, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_us.fetch_add(micros, Ordering::Relaxed);
        if let Some(slot) = self.by_status.get(usize::from(status)) {
            slot.fetch_add(1, Ordering::Relaxed);
        }

        counter!(names::RESPONSES_SENT_TOTAL, "status" => status.to_string()).increment(1);
        histogram!(names::REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_responses_sent_by_status = self
            .by_status
            .iter()
            .enumerate()
            .filter_map(|(code, slot)| {
                let count = slot.load(Ordering::Relaxed);
                (count > 0).then(|| (code.to_string(), count))
            })
            .collect();

        MetricsSnapshot {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
            total_responses_sent_by_status,
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// Installs the global recorder with an HTTP listener on `metrics_addr` and
/// describes every metric this crate emits.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_RECEIVED_TOTAL,
        "Total number of requests entering the pipeline"
    );
    describe_counter!(
        names::RESPONSES_SENT_TOTAL,
        "Total number of responses sent, by status code"
    );
    describe_counter!(
        names::PANICS_RECOVERED_TOTAL,
        "Total number of handler panics recovered"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        names::RATE_LIMITER_TRACKED_CLIENTS,
        "Client IPs currently tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

pub fn record_panic_recovered() {
    counter!(names::PANICS_RECOVERED_TOTAL).increment(1);
}

pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

pub fn set_tracked_clients(count: usize) {
    gauge!(names::RATE_LIMITER_TRACKED_CLIENTS).set(count as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = RequestMetrics::new();
        metrics.record_received();
        metrics.record_received();
        metrics.record_sent(200, Duration::from_micros(150));
        metrics.record_sent(429, Duration::from_micros(50));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests_received, 2);
        assert_eq!(snapshot.total_responses_sent, 2);
        assert_eq!(snapshot.total_processing_time_us, 200);
        assert_eq!(snapshot.total_responses_sent_by_status["200"], 1);
        assert_eq!(snapshot.total_responses_sent_by_status["429"], 1);
        assert_eq!(snapshot.total_responses_sent_by_status.len(), 2);
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(RequestMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_facade_calls_without_recorder() {
        // Should not panic even without an exporter installed
        record_panic_recovered();
        record_rate_limited();
        set_tracked_clients(3);
    }
}
