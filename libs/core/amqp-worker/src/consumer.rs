//! Delivery loop: decode, process, settle.

use crate::config::PREFETCH_COUNT;
use crate::delivery::InboundDelivery;
use crate::error::{AmqpError, Result};
use crate::metrics::ConsumerMetrics;
use futures::{Stream, StreamExt};
use lapin::options::{BasicConsumeOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use messaging::{Disposition, Message, ProcessingError, Processor};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Why [`MessageConsumer::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeExit {
    /// Stop was requested.
    Stopped,
    /// The delivery stream errored or ended under us.
    StreamFailed(String),
}

/// Pulls deliveries one at a time and translates the processor's outcome
/// into the acknowledgment protocol:
///
/// - success: ack
/// - transient / rate-limited failure or handler timeout: nack with requeue
/// - undecodable body or permanent failure: reject without requeue
///
/// With prefetch 1 the broker never hands us a second message before the
/// first is settled, so messages are processed and acknowledged in delivery
/// order.
pub struct MessageConsumer<M, P> {
    processor: Arc<P>,
    queue: String,
    handler_timeout: Duration,
    metrics: ConsumerMetrics,
    _message: PhantomData<fn() -> M>,
}

impl<M, P> Clone for MessageConsumer<M, P> {
    fn clone(&self) -> Self {
        Self {
            processor: self.processor.clone(),
            queue: self.queue.clone(),
            handler_timeout: self.handler_timeout,
            metrics: self.metrics.clone(),
            _message: PhantomData,
        }
    }
}

impl<M, P> MessageConsumer<M, P>
where
    M: Message,
    P: Processor<M> + 'static,
{
    pub fn new(processor: Arc<P>, queue: impl Into<String>, handler_timeout: Duration) -> Self {
        let queue = queue.into();
        let metrics = ConsumerMetrics::new(&queue, processor.name());
        Self {
            processor,
            queue,
            handler_timeout,
            metrics,
            _message: PhantomData,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn metrics(&self) -> &ConsumerMetrics {
        &self.metrics
    }

    /// Set prefetch and start a manual-ack subscription on the queue.
    pub async fn subscribe(&self, channel: &Channel, consumer_tag: &str) -> Result<lapin::Consumer> {
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| AmqpError::Consumer(format!("basic.qos: {e}")))?;

        let consumer = channel
            .basic_consume(
                &self.queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| AmqpError::Consumer(format!("basic.consume on '{}': {e}", self.queue)))?;

        info!(queue = %self.queue, consumer_tag, prefetch = PREFETCH_COUNT, "Subscribed");
        Ok(consumer)
    }

    /// Drive the delivery loop until `stop` flips or the stream fails.
    ///
    /// Stop is only observed between messages: a message that is being
    /// processed always runs to completion and is settled first.
    pub async fn run<S, D>(&self, mut deliveries: S, mut stop: watch::Receiver<bool>) -> ConsumeExit
    where
        S: Stream<Item = Result<D>> + Unpin,
        D: InboundDelivery,
    {
        info!(queue = %self.queue, processor = self.processor.name(), "Consumer loop started");

        let exit = loop {
            if *stop.borrow_and_update() {
                break ConsumeExit::Stopped;
            }

            tokio::select! {
                biased;

                changed = stop.changed() => {
                    if changed.is_err() {
                        break ConsumeExit::Stopped;
                    }
                }

                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        self.handle(delivery).await;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Delivery stream failed");
                        break ConsumeExit::StreamFailed(e.to_string());
                    }
                    None => {
                        warn!("Delivery stream ended");
                        break ConsumeExit::StreamFailed("delivery stream ended".to_string());
                    }
                },
            }
        };

        info!(queue = %self.queue, ?exit, "Consumer loop stopped");
        exit
    }

    /// Process one delivery and settle it.
    #[instrument(skip_all, fields(queue = %self.queue, message_id = ?delivery.message_id()))]
    pub async fn handle<D: InboundDelivery>(&self, delivery: D) -> Disposition {
        let started = Instant::now();
        self.metrics.message_received(delivery.redelivered());

        let (outcome, reason) = match serde_json::from_slice::<M>(delivery.payload()) {
            Ok(message) => self.process(&message).await,
            Err(e) => {
                warn!(error = %e, "Undecodable message body");
                (Err(ProcessingError::from(e)), "decode")
            }
        };

        let disposition = Disposition::for_outcome(&outcome);
        match &outcome {
            Ok(()) => debug!("Message processed"),
            Err(e) if disposition == Disposition::Requeue => {
                warn!(error = %e, category = %e.category(), "Processing failed, requeueing")
            }
            Err(e) => {
                error!(error = %e, category = %e.category(), "Processing failed permanently, rejecting")
            }
        }

        if let Err(e) = delivery.settle(disposition).await {
            self.metrics.settle_failed();
            error!(error = %e, %disposition, "Failed to settle delivery");
        }

        self.metrics
            .message_settled(disposition, reason, started.elapsed());
        disposition
    }

    async fn process(&self, message: &M) -> (std::result::Result<(), ProcessingError>, &'static str) {
        match tokio::time::timeout(self.handler_timeout, self.processor.process(message)).await {
            Ok(Ok(())) => (Ok(()), "processed"),
            Ok(Err(e)) => (Err(e), "handler"),
            Err(_) => (
                Err(ProcessingError::transient(format!(
                    "{} timed out after {:?}",
                    self.processor.name(),
                    self.handler_timeout
                ))),
                "timeout",
            ),
        }
    }
}
