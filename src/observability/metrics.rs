//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define directory metrics (connections, operations, imports)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `directory_active_connections` (gauge): current connection count
//! - `directory_connections_total` (counter): accepted connections
//! - `directory_operations_total` (counter): operations by type and result code
//! - `directory_entries` (gauge): entries held after the last import
//! - `directory_ldif_imports_total` (counter): imports by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so the library
//!   never depends on the exporter being enabled

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::protocol::message::ResultCode;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    tracing::info!(address = %address, "Prometheus exporter listening");
    Ok(())
}

pub fn connection_opened() {
    counter!("directory_connections_total").increment(1);
    gauge!("directory_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("directory_active_connections").decrement(1.0);
}

pub fn record_operation(operation: &'static str, code: ResultCode) {
    counter!(
        "directory_operations_total",
        "operation" => operation,
        "result" => code.as_str()
    )
    .increment(1);
}

pub fn record_import(success: bool, entries: usize) {
    let outcome = if success { "success" } else { "failure" };
    counter!("directory_ldif_imports_total", "outcome" => outcome).increment(1);
    if success {
        gauge!("directory_entries").set(entries as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_harmless() {
        connection_opened();
        connection_closed();
        record_operation("bind", ResultCode::Success);
        record_import(true, 3);
    }
}
