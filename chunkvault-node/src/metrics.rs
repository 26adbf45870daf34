//! Prometheus metrics for the storage node

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Metric names as constants
pub mod names {
    pub const BLOBS_STORED: &str = "chunkvault_node_blobs_stored";
    pub const REQUESTS_TOTAL: &str = "chunkvault_node_requests_total";
    pub const REQUESTS_DURATION: &str = "chunkvault_node_request_duration_seconds";
    pub const REQUEST_BYTES: &str = "chunkvault_node_request_bytes_total";
    pub const REQUEST_ERRORS: &str = "chunkvault_node_request_errors_total";
}

/// Install the Prometheus recorder and describe every metric.
pub fn install_recorder() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_gauge!(names::BLOBS_STORED, "Number of blobs on disk");
    describe_counter!(names::REQUESTS_TOTAL, "Blob requests served, by operation");
    describe_histogram!(names::REQUESTS_DURATION, "Blob request duration in seconds");
    describe_counter!(names::REQUEST_BYTES, "Blob bytes received or sent");
    describe_counter!(names::REQUEST_ERRORS, "Blob requests that failed");

    Ok(handle)
}

/// Per-node metrics recorder
#[derive(Debug, Clone)]
pub struct NodeMetrics {
    node_id: String,
}

impl NodeMetrics {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }

    pub fn record(&self, operation: &'static str, bytes: usize, duration: Duration) {
        let labels = [
            ("node_id", self.node_id.clone()),
            ("operation", operation.to_string()),
        ];
        counter!(names::REQUESTS_TOTAL, &labels).increment(1);
        histogram!(names::REQUESTS_DURATION, &labels).record(duration.as_secs_f64());
        if bytes > 0 {
            counter!(names::REQUEST_BYTES, &labels).increment(bytes as u64);
        }
    }

    pub fn record_error(&self, operation: &'static str) {
        counter!(
            names::REQUEST_ERRORS,
            "node_id" => self.node_id.clone(),
            "operation" => operation
        )
        .increment(1);
    }

    pub fn set_blob_count(&self, count: u64) {
        gauge!(names::BLOBS_STORED, "node_id" => self.node_id.clone()).set(count as f64);
    }
}
