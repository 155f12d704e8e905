use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use crate::error::{AppError, Result};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Prometheus metrics for the shipping service.
///
/// Recording is a no-op until [`init_metrics`] installs a recorder.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    /// `outcome` is one of `fresh`, `duplicate`, `in_progress`, `abandoned`.
    pub fn record_claim(&self, outcome: &'static str) {
        counter!("idempotency_claims_total", "outcome" => outcome).increment(1);
    }

    pub fn record_publish(&self, success: bool) {
        counter!("idempotency_publishes_total", "success" => success.to_string()).increment(1);
    }

    pub fn record_reconciliation(&self) {
        counter!("idempotency_reconciliations_total").increment(1);
    }

    pub fn record_store_operation(
        &self,
        store: &'static str,
        operation: &'static str,
        duration_ms: f64,
        success: bool,
    ) {
        counter!("idempotency_store_operations_total", "store" => store, "operation" => operation, "success" => success.to_string()).increment(1);
        histogram!("idempotency_store_operation_duration_ms", "store" => store, "operation" => operation).record(duration_ms);
    }

    pub fn record_order_persisted(&self, duration_ms: f64, success: bool) {
        counter!("shipping_orders_persisted_total", "success" => success.to_string()).increment(1);
        histogram!("shipping_order_persist_duration_ms").record(duration_ms);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder and returns its handle.
/// Calling it again returns the handle installed the first time.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))
    })?;
    describe_metrics();

    METRICS.get_or_init(Metrics::new);
    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!("idempotency_claims_total", Unit::Count, "Idempotency claims by outcome");
    describe_counter!("idempotency_publishes_total", Unit::Count, "Idempotency result publishes");
    describe_counter!("idempotency_reconciliations_total", Unit::Count, "Stuck records repaired from the business store");
    describe_counter!("idempotency_store_operations_total", Unit::Count, "Shared store operations");
    describe_histogram!("idempotency_store_operation_duration_ms", Unit::Milliseconds, "Shared store operation latency in milliseconds");

    describe_counter!("shipping_orders_persisted_total", Unit::Count, "Shipping order writes");
    describe_histogram!("shipping_order_persist_duration_ms", Unit::Milliseconds, "Shipping order write latency in milliseconds");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
