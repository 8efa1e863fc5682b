//! The seam between [`ConsumerLifecycle`](crate::ConsumerLifecycle) and the
//! broker: open a consuming session, close it, report health.

use crate::connection::BrokerConnection;
use crate::consumer::{ConsumeExit, MessageConsumer};
use crate::error::{AmqpError, Result};
use crate::topology::TopologyInitializer;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::BasicCancelOptions;
use messaging::{Message, Processor};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// A running subscription.
///
/// `failures` yields once the session can no longer deliver messages
/// (connection or channel closed, delivery stream ended).
pub struct Session {
    failures: mpsc::UnboundedReceiver<String>,
    stop: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl Session {
    pub fn new(
        failures: mpsc::UnboundedReceiver<String>,
        stop: watch::Sender<bool>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            failures,
            stop,
            worker,
        }
    }

    /// Resolves with the failure reason.
    pub async fn failed(&mut self) -> String {
        self.failures
            .recv()
            .await
            .unwrap_or_else(|| "session failure channel closed".to_string())
    }

    /// Ask the consume loop to stop and wait for it; an in-flight message is
    /// finished and settled first.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Consume task ended abnormally");
        }
    }
}

/// Something [`ConsumerLifecycle`](crate::ConsumerLifecycle) can (re)open.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connect, declare topology and subscribe.
    async fn open(&self) -> Result<Session>;

    /// Cancel the subscription and release the connection. Idempotent.
    async fn close(&self);

    async fn is_healthy(&self) -> bool;
}

/// [`Transport`] over a [`BrokerConnection`]: connect, then
/// [`TopologyInitializer::declare`], then [`MessageConsumer::subscribe`].
pub struct AmqpTransport<M, P> {
    connection: Arc<BrokerConnection>,
    topology: TopologyInitializer,
    consumer: MessageConsumer<M, P>,
    consumer_tag: Mutex<Option<String>>,
}

impl<M, P> AmqpTransport<M, P>
where
    M: Message,
    P: Processor<M> + 'static,
{
    pub fn new(
        connection: Arc<BrokerConnection>,
        topology: TopologyInitializer,
        consumer: MessageConsumer<M, P>,
    ) -> Self {
        Self {
            connection,
            topology,
            consumer,
            consumer_tag: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &Arc<BrokerConnection> {
        &self.connection
    }
}

#[async_trait]
impl<M, P> Transport for AmqpTransport<M, P>
where
    M: Message,
    P: Processor<M> + 'static,
{
    #[instrument(skip(self), fields(queue = %self.consumer.queue()))]
    async fn open(&self) -> Result<Session> {
        let (failure_tx, failures) = mpsc::unbounded_channel();

        let notify = failure_tx.clone();
        self.connection
            .connect(move |reason| {
                let _ = notify.send(reason);
            })
            .await?;

        let channel = self.connection.channel().await?;
        let queue = self.topology.declare(&channel).await?;
        self.consumer.metrics().queue_depth(queue.message_count);

        let tag = format!("{}-{}", queue.name, Uuid::new_v4());
        let deliveries = self.consumer.subscribe(&channel, &tag).await?;
        *self.consumer_tag.lock().await = Some(tag);

        let (stop, stop_rx) = watch::channel(false);
        let consumer = self.consumer.clone();
        let worker = tokio::spawn(async move {
            let deliveries = deliveries
                .map(|delivery| delivery.map_err(|e| AmqpError::Consumer(e.to_string())))
                .boxed();

            if let ConsumeExit::StreamFailed(reason) = consumer.run(deliveries, stop_rx).await {
                let _ = failure_tx.send(reason);
            }
        });

        Ok(Session::new(failures, stop, worker))
    }

    async fn close(&self) {
        if let Some(tag) = self.consumer_tag.lock().await.take() {
            if let Ok(channel) = self.connection.channel().await {
                if let Err(e) = channel
                    .basic_cancel(&tag, BasicCancelOptions::default())
                    .await
                {
                    debug!(error = %e, consumer_tag = %tag, "basic.cancel failed");
                }
            }
        }
        self.connection.close().await;
    }

    async fn is_healthy(&self) -> bool {
        self.connection.is_healthy().await
    }
}
