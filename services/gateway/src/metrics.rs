//! Prometheus metrics exposition and runtime counters
//!
//! Gateway-level metrics:
//!
//! - `gateway_requests_total` (counter): label `outcome` ("ok" or a dispatch
//!   failure kind such as "quota_exceeded")
//! - `gateway_request_duration_seconds` (histogram): label `outcome`
//!
//! The dispatch crate records its own `dispatch_attempts_total` and
//! `dispatch_key_rotations_total` counters; together with the above they
//! answer both "how are requests doing" and "how hard is the key pool
//! working to keep them doing it".

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `gateway_request_duration_seconds` with histogram buckets so it
/// renders as a Prometheus histogram (with `_bucket` lines for
/// `histogram_quantile()` queries) rather than the default summary. Generation
/// calls against a vision model routinely take tens of seconds, and a request
/// that rides out quota backoff can run for minutes, so the buckets stretch
/// from 50ms to 300s.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "gateway_request_duration_seconds".to_string(),
            ),
            &[
                0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed generation request with its outcome label.
pub fn record_request(outcome: &str, duration_secs: f64) {
    metrics::counter!("gateway_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// Runtime counters tracked while the service is running
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Number of requests currently being processed. Used for drain coordination:
    /// on shutdown, the service waits until this reaches 0 (or the drain deadline
    /// expires) before exiting.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}
