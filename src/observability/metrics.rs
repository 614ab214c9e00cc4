//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Record lifecycle phase outcomes and durations per registry
//! - Track readiness and HTTP request counts
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `registry_phase_total` (counter): phase runs by registry, phase, result
//! - `registry_phase_duration_seconds` (histogram): time spent in a phase
//! - `registry_services_ready` (gauge): services that fired their ready signal
//! - `registry_stop_requests_total` (counter): stop requests that cancelled services
//! - `http_requests_total` (counter): requests served by the HTTP service
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which keeps tests quiet

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const METRIC_PHASE_TOTAL: &str = "registry_phase_total";
pub const METRIC_PHASE_DURATION: &str = "registry_phase_duration_seconds";
pub const METRIC_SERVICES_READY: &str = "registry_services_ready";
pub const METRIC_STOP_REQUESTS: &str = "registry_stop_requests_total";
pub const METRIC_HTTP_REQUESTS: &str = "http_requests_total";

const BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .set_buckets(BUCKETS)?
        .with_http_listener(addr)
        .install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record the outcome of one lifecycle phase.
pub fn record_phase(registry: &str, phase: &str, ok: bool, started: Instant) {
    let result = if ok { "ok" } else { "error" };
    metrics::counter!(
        METRIC_PHASE_TOTAL,
        "registry" => registry.to_string(),
        "phase" => phase.to_string(),
        "result" => result
    )
    .increment(1);
    metrics::histogram!(
        METRIC_PHASE_DURATION,
        "registry" => registry.to_string(),
        "phase" => phase.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn set_services_ready(registry: &str, count: usize) {
    metrics::gauge!(METRIC_SERVICES_READY, "registry" => registry.to_string()).set(count as f64);
}

pub fn record_stop_request(registry: &str) {
    metrics::counter!(METRIC_STOP_REQUESTS, "registry" => registry.to_string()).increment(1);
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!(METRIC_HTTP_REQUESTS, &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}
