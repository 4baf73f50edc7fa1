//! Prometheus metrics for azurefs.
//!
//! Defines metric name constants, installs a global Prometheus recorder
//! using `metrics-exporter-prometheus`, and provides small recording
//! helpers for adapter operations and remote requests.  Without an
//! installed recorder every macro is a no-op, so library users and tests
//! pay nothing.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Total adapter operations (counter). Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "azurefs_operations_total";

/// Total remote requests (counter). Labels: operation, status.
pub const REMOTE_REQUESTS_TOTAL: &str = "azurefs_remote_requests_total";

/// Remote request duration in seconds (histogram). Labels: operation.
pub const REMOTE_REQUEST_DURATION_SECONDS: &str = "azurefs_remote_request_duration_seconds";

/// Total bytes uploaded (counter).
pub const BYTES_WRITTEN_TOTAL: &str = "azurefs_bytes_written_total";

/// Total bytes downloaded (counter).
pub const BYTES_READ_TOTAL: &str = "azurefs_bytes_read_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times. Returns a reference to the global handle.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Total adapter operations by type");
    describe_counter!(REMOTE_REQUESTS_TOTAL, "Total remote share requests by type");
    describe_histogram!(
        REMOTE_REQUEST_DURATION_SECONDS,
        "Remote share request duration in seconds"
    );
    describe_counter!(BYTES_WRITTEN_TOTAL, "Total bytes uploaded");
    describe_counter!(BYTES_READ_TOTAL, "Total bytes downloaded");
}

/// Render the Prometheus exposition text, if a recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

// -- Recording helpers --------------------------------------------------------

/// Count one adapter operation by outcome.
pub fn record_operation<T, E>(operation: &'static str, result: &Result<T, E>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
}

/// Count one remote request and record its duration.
pub fn record_remote_request(operation: &'static str, status: u16, duration_secs: f64) {
    counter!(
        REMOTE_REQUESTS_TOTAL,
        "operation" => operation,
        "status" => status_class(status)
    )
    .increment(1);
    histogram!(REMOTE_REQUEST_DURATION_SECONDS, "operation" => operation).record(duration_secs);
}

/// Count uploaded bytes.
pub fn record_bytes_written(len: usize) {
    counter!(BYTES_WRITTEN_TOTAL).increment(len as u64);
}

/// Count downloaded bytes.
pub fn record_bytes_read(len: usize) {
    counter!(BYTES_READ_TOTAL).increment(len as u64);
}

/// Collapse a status code to its class (`2xx`, `4xx`, ...) to keep label
/// cardinality bounded.  `0` means no response was received.
fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        404 => "404",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "none",
    }
}

// -- Tests --------------------------------------------------------------------
