//! Prometheus metrics for the gateway
//!
//! Exposed at `GET /metrics` in Prometheus text format.

use axum::{routing::get, Router};
use chunkvault_rebalancer::RepairReport;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Metric names as constants
pub mod names {
    pub const UPLOADS_TOTAL: &str = "chunkvault_uploads_total";
    pub const DOWNLOADS_TOTAL: &str = "chunkvault_downloads_total";
    pub const BYTES_UPLOADED: &str = "chunkvault_bytes_uploaded_total";
    pub const BYTES_DOWNLOADED: &str = "chunkvault_bytes_downloaded_total";
    pub const OPERATION_DURATION: &str = "chunkvault_operation_duration_seconds";
    pub const REPLICA_WRITE_FAILURES: &str = "chunkvault_replica_write_failures_total";
    pub const REPLICA_READ_FAILURES: &str = "chunkvault_replica_read_failures_total";
    pub const REPAIR_CYCLES: &str = "chunkvault_repair_cycles_total";
    pub const REPAIR_REPLICAS_WRITTEN: &str = "chunkvault_repair_replicas_written_total";
    pub const REPAIR_WRITE_FAILURES: &str = "chunkvault_repair_write_failures_total";
    pub const DEGRADED_FILES: &str = "chunkvault_degraded_files_total";
    pub const NODES: &str = "chunkvault_nodes";
}

/// Install the Prometheus recorder and describe every metric.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(names::UPLOADS_TOTAL, "Uploads by outcome");
    describe_counter!(names::DOWNLOADS_TOTAL, "Downloads by outcome");
    describe_counter!(names::BYTES_UPLOADED, "Plaintext bytes accepted");
    describe_counter!(names::BYTES_DOWNLOADED, "Plaintext bytes served");
    describe_histogram!(names::OPERATION_DURATION, "Upload and download duration in seconds");
    describe_counter!(names::REPLICA_WRITE_FAILURES, "Replica writes that failed, by node");
    describe_counter!(names::REPLICA_READ_FAILURES, "Replica reads that failed, by node");
    describe_counter!(names::REPAIR_CYCLES, "Repair cycles run");
    describe_counter!(names::REPAIR_REPLICAS_WRITTEN, "Replicas created by repair");
    describe_counter!(names::REPAIR_WRITE_FAILURES, "Repair copies that failed on the target");
    describe_counter!(names::DEGRADED_FILES, "Files marked DEGRADED by repair");
    describe_gauge!(names::NODES, "Storage nodes by status");

    Ok(handle)
}

/// `/metrics` route that can be merged into any router
pub fn routes<S: Clone + Send + Sync + 'static>(handle: PrometheusHandle) -> Router<S> {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

pub fn record_upload(outcome: &'static str, bytes: u64, duration: Duration) {
    counter!(names::UPLOADS_TOTAL, "outcome" => outcome).increment(1);
    if outcome == "ok" {
        counter!(names::BYTES_UPLOADED).increment(bytes);
    }
    histogram!(names::OPERATION_DURATION, "operation" => "upload").record(duration.as_secs_f64());
}

pub fn record_download(outcome: &'static str, bytes: u64, duration: Duration) {
    counter!(names::DOWNLOADS_TOTAL, "outcome" => outcome).increment(1);
    if outcome == "ok" {
        counter!(names::BYTES_DOWNLOADED).increment(bytes);
    }
    histogram!(names::OPERATION_DURATION, "operation" => "download").record(duration.as_secs_f64());
}

pub fn record_replica_write_failure(node_id: &str) {
    counter!(names::REPLICA_WRITE_FAILURES, "node_id" => node_id.to_string()).increment(1);
}

pub fn record_replica_read_failure(node_id: &str) {
    counter!(names::REPLICA_READ_FAILURES, "node_id" => node_id.to_string()).increment(1);
}

pub fn record_repair(report: &RepairReport) {
    counter!(names::REPAIR_CYCLES).increment(1);
    counter!(names::REPAIR_REPLICAS_WRITTEN).increment(report.replicas_written as u64);
    counter!(names::REPAIR_WRITE_FAILURES).increment(report.failed_writes as u64);
    counter!(names::DEGRADED_FILES).increment(report.degraded_files as u64);
}

pub fn set_node_counts(up: usize, down: usize, unknown: usize) {
    gauge!(names::NODES, "status" => "up").set(up as f64);
    gauge!(names::NODES, "status" => "down").set(down as f64);
    gauge!(names::NODES, "status" => "unknown").set(unknown as f64);
}
