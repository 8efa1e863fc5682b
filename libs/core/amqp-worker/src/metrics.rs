//! Prometheus metrics for the AMQP worker.

use crate::lifecycle::LifecycleState;
use messaging::Disposition;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Consumer-side metrics, labelled by queue and processor.
#[derive(Clone)]
pub struct ConsumerMetrics {
    queue: String,
    processor: String,
}

impl ConsumerMetrics {
    pub fn new(queue: &str, processor: &str) -> Self {
        Self {
            queue: queue.to_string(),
            processor: processor.to_string(),
        }
    }

    pub fn message_received(&self, redelivered: bool) {
        counter!(
            "amqp_worker_messages_received_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone(),
            "redelivered" => redelivered.to_string()
        )
        .increment(1);
    }

    /// Record how a delivery was settled and how long it took.
    pub fn message_settled(&self, disposition: Disposition, reason: &'static str, duration: Duration) {
        counter!(
            "amqp_worker_messages_settled_total",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone(),
            "disposition" => disposition.as_str(),
            "reason" => reason
        )
        .increment(1);

        histogram!(
            "amqp_worker_message_duration_seconds",
            "queue" => self.queue.clone(),
            "processor" => self.processor.clone()
        )
        .record(duration.as_secs_f64());
    }

    pub fn settle_failed(&self) {
        counter!(
            "amqp_worker_settle_failures_total",
            "queue" => self.queue.clone()
        )
        .increment(1);
    }

    pub fn queue_depth(&self, depth: u32) {
        gauge!("amqp_worker_queue_depth", "queue" => self.queue.clone()).set(f64::from(depth));
    }
}

pub fn message_published(exchange: &str) {
    counter!("amqp_worker_published_total", "exchange" => exchange.to_string()).increment(1);
}

pub fn publish_failed(exchange: &str) {
    counter!("amqp_worker_publish_failures_total", "exchange" => exchange.to_string())
        .increment(1);
}

pub fn reconnect_attempt(outcome: &'static str) {
    counter!("amqp_worker_reconnect_attempts_total", "outcome" => outcome).increment(1);
}

pub fn lifecycle_state(state: LifecycleState) {
    gauge!("amqp_worker_lifecycle_state").set(f64::from(state.as_gauge()));
}

/// Install the Prometheus recorder once per process.
///
/// Later calls return the handle installed by the first one.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PROMETHEUS
        .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
        .cloned()
}
