//! Observability infrastructure for the ModelFox client
//!
//! Provides:
//! - Prometheus metrics (prediction latency, queued events, flush outcomes)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for batch prediction latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ClientMetricsInner> = OnceLock::new();

struct ClientMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions: IntCounter,
    prediction_errors: IntCounter,
    queued_events: IntGauge,
    events_flushed: IntCounter,
    flush_failures: IntCounter,
}

impl ClientMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "modelfox_prediction_latency_seconds",
                "Time spent evaluating one batch of predictions",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions: register_int_counter!(
                "modelfox_predictions_total",
                "Total number of inputs predicted"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter!(
                "modelfox_prediction_errors_total",
                "Total number of failed predict calls"
            )
            .expect("Failed to register prediction_errors_total"),

            queued_events: register_int_gauge!(
                "modelfox_queued_events",
                "Number of events waiting in the log queue"
            )
            .expect("Failed to register queued_events"),

            events_flushed: register_int_counter!(
                "modelfox_events_flushed_total",
                "Total number of events delivered to the tracking endpoint"
            )
            .expect("Failed to register events_flushed_total"),

            flush_failures: register_int_counter!(
                "modelfox_flush_failures_total",
                "Total number of failed event deliveries"
            )
            .expect("Failed to register flush_failures_total"),
        }
    }

    /// Metrics outside the default registry, private to one test
    #[cfg(test)]
    fn unregistered() -> Self {
        use prometheus::HistogramOpts;
        Self {
            prediction_latency_seconds: Histogram::with_opts(
                HistogramOpts::new("latency", "latency").buckets(LATENCY_BUCKETS.to_vec()),
            )
            .unwrap(),
            predictions: IntCounter::new("predictions", "predictions").unwrap(),
            prediction_errors: IntCounter::new("errors", "errors").unwrap(),
            queued_events: IntGauge::new("queued", "queued").unwrap(),
            events_flushed: IntCounter::new("flushed", "flushed").unwrap(),
            flush_failures: IntCounter::new("failures", "failures").unwrap(),
        }
    }
}

/// Client metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the same
/// underlying metrics, so every model sharing the gauge reports its queue as a
/// delta.
#[derive(Clone)]
pub struct ClientMetrics {
    inner: &'static ClientMetricsInner,
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(ClientMetricsInner::new),
        }
    }

    #[cfg(test)]
    pub(crate) fn unregistered() -> Self {
        Self {
            inner: Box::leak(Box::new(ClientMetricsInner::unregistered())),
        }
    }

    fn inner(&self) -> &ClientMetricsInner {
        self.inner
    }

    #[cfg(test)]
    pub(crate) fn queued_events(&self) -> i64 {
        self.inner.queued_events.get()
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, count: u64) {
        self.inner().predictions.inc_by(count);
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    /// Events were added to a log queue
    pub fn add_queued_events(&self, count: usize) {
        self.inner().queued_events.add(count as i64);
    }

    /// Events left a log queue, delivered or dropped with their model
    pub fn sub_queued_events(&self, count: usize) {
        self.inner().queued_events.sub(count as i64);
    }

    pub fn inc_events_flushed(&self, count: usize) {
        self.inner().events_flushed.inc_by(count as u64);
    }

    pub fn inc_flush_failures(&self) {
        self.inner().flush_failures.inc();
    }
}

/// Structured logger for client events
///
/// Provides consistent JSON-formatted records for model loads, reloads,
/// flushes and shutdown.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_model_loaded(&self, model_id: &str, task: &str, source: &str) {
        info!(
            event = "model_loaded",
            service = %self.service,
            model_id = %model_id,
            task = %task,
            source = %source,
            "Model loaded"
        );
    }

    /// Log a model reload, successful or not
    pub fn log_model_reload(&self, old_id: &str, new_id: Option<&str>, error: Option<&str>) {
        match (new_id, error) {
            (Some(new_id), _) => {
                info!(
                    event = "model_reloaded",
                    service = %self.service,
                    old_model_id = %old_id,
                    new_model_id = %new_id,
                    "Model reloaded"
                );
            }
            (None, error) => {
                warn!(
                    event = "model_reload_failed",
                    service = %self.service,
                    model_id = %old_id,
                    error = error.unwrap_or("unknown"),
                    "Model reload failed, keeping previous model"
                );
            }
        }
    }

    pub fn log_flush(&self, sent: usize, remaining: usize) {
        info!(
            event = "log_queue_flushed",
            service = %self.service,
            sent = sent,
            remaining = remaining,
            "Flushed log queue"
        );
    }

    pub fn log_flush_failed(&self, queued: usize, status: Option<u16>, error: &str) {
        warn!(
            event = "log_queue_flush_failed",
            service = %self.service,
            queued = queued,
            status = ?status,
            error = %error,
            "Failed to flush log queue, events kept for retry"
        );
    }

    pub fn log_startup(&self, version: &str, model_id: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            model_id = %model_id,
            "ModelFox service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str, queued: usize) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            queued = queued,
            "ModelFox service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_metrics_handles_share_registry() {
        let metrics = ClientMetrics::new();
        let other = metrics.clone();

        metrics.observe_prediction_latency(0.002);
        metrics.inc_predictions(3);
        other.inc_prediction_errors();
        other.add_queued_events(2);
        other.sub_queued_events(2);
        metrics.inc_events_flushed(2);
        metrics.inc_flush_failures();

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"modelfox_predictions_total".to_string()));
        assert!(names.contains(&"modelfox_queued_events".to_string()));
    }

    #[test]
    fn test_queued_events_gauge_sums_handles() {
        let metrics = ClientMetrics::unregistered();
        let other = metrics.clone();

        metrics.add_queued_events(2);
        other.add_queued_events(3);
        assert_eq!(metrics.queued_events(), 5);

        other.sub_queued_events(3);
        assert_eq!(metrics.queued_events(), 2);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("modelfox-serve");
        assert_eq!(logger.service, "modelfox-serve");
        logger.log_model_reload("abc", None, Some("truncated file"));
    }
}
