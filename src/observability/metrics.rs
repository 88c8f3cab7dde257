//! Metrics collection and exposition.
//!
//! # Metrics
//! - `microapp_discovery_registrations_total` (counter): by `result`
//! - `microapp_shutdowns_total` (counter): by `trigger`
//! - `microapp_backend_shutdown_errors_total` (counter): by `backend`
//! - `microapp_rpc_requests_total` (counter): by `handler`, `status`
//!
//! Without an installed recorder every update is a no-op, which is what the
//! tests rely on.

use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

pub fn record_registration(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("microapp_discovery_registrations_total", "result" => result).increment(1);
}

pub fn record_shutdown(trigger: &'static str) {
    counter!("microapp_shutdowns_total", "trigger" => trigger).increment(1);
}

pub fn record_shutdown_error(backend: &'static str) {
    counter!("microapp_backend_shutdown_errors_total", "backend" => backend).increment(1);
}

pub fn record_rpc_request(handler: &str, status: &'static str) {
    counter!(
        "microapp_rpc_requests_total",
        "handler" => handler.to_string(),
        "status" => status
    )
    .increment(1);
}
