//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, retries, breaker, streaming)
//! - Expose Prometheus-compatible metrics endpoint
//! - Label everything with the backend
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_retry_total` (counter): retries by method, backend
//! - `proxy_circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `proxy_circuit_breaker_failures_total` (counter): failures fed to the breaker
//! - `proxy_streaming_requests_total` (counter): SSE/WebSocket requests by type
//! - `proxy_streaming_errors_total` (counter): streaming failures by reason
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Histogram buckets tuned for typical web latencies

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::resilience::circuit_breaker::CircuitState;

const REQUESTS_TOTAL: &str = "proxy_requests_total";
const REQUEST_DURATION: &str = "proxy_request_duration_seconds";
const RETRY_TOTAL: &str = "proxy_retry_total";
const BREAKER_STATE: &str = "proxy_circuit_breaker_state";
const BREAKER_FAILURES: &str = "proxy_circuit_breaker_failures_total";
const STREAMING_REQUESTS: &str = "proxy_streaming_requests_total";
const STREAMING_ERRORS: &str = "proxy_streaming_errors_total";

const DURATION_BUCKETS: [f64; 14] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            &DURATION_BUCKETS,
        )?
        .install()?;

    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total proxied requests by method, status and backend");
    describe_histogram!(REQUEST_DURATION, "Proxied request latency in seconds");
    describe_counter!(RETRY_TOTAL, "Retried upstream attempts by method and backend");
    describe_gauge!(BREAKER_STATE, "Circuit breaker state (0=closed, 1=open, 2=half-open)");
    describe_counter!(BREAKER_FAILURES, "Failures recorded by the circuit breaker");
    describe_counter!(STREAMING_REQUESTS, "Streaming requests by stream type");
    describe_counter!(STREAMING_ERRORS, "Streaming failures by reason");
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];
    counter!(REQUESTS_TOTAL, &labels).increment(1);
    histogram!(REQUEST_DURATION, &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_retries(method: &str, backend: &str, retries: u32) {
    if retries == 0 {
        return;
    }
    counter!(RETRY_TOTAL, "method" => method.to_string(), "backend" => backend.to_string())
        .increment(u64::from(retries));
}

pub fn record_breaker_state(backend: &str, state: CircuitState) {
    gauge!(BREAKER_STATE, "backend" => backend.to_string()).set(state.as_gauge());
}

pub fn record_breaker_failure(backend: &str) {
    counter!(BREAKER_FAILURES, "backend" => backend.to_string()).increment(1);
}

pub fn record_streaming_request(stream_type: &'static str, backend: &str) {
    counter!(STREAMING_REQUESTS, "stream_type" => stream_type, "backend" => backend.to_string())
        .increment(1);
}

pub fn record_streaming_error(reason: &'static str, backend: &str) {
    counter!(STREAMING_ERRORS, "reason" => reason, "backend" => backend.to_string()).increment(1);
}
