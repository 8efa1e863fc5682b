//! Publishing messages onto the exchange.

use crate::connection::BrokerConnection;
use crate::error::{AmqpError, Result};
use crate::metrics;
use lapin::options::BasicPublishOptions;
use lapin::types::ShortString;
use lapin::BasicProperties;
use messaging::Message;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// AMQP delivery mode 2: the broker persists the message before confirming.
const PERSISTENT: u8 = 2;
const CONTENT_TYPE_JSON: &str = "application/json";

/// Publishes JSON-encoded messages on the shared [`BrokerConnection`].
///
/// No buffering and no retries: when the channel is not usable the publish
/// fails immediately and the caller decides what to do.
#[derive(Clone)]
pub struct MessagePublisher {
    connection: Arc<BrokerConnection>,
    exchange: String,
    routing_key: String,
}

impl MessagePublisher {
    pub fn new(
        connection: Arc<BrokerConnection>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Publish one message and wait for the broker's confirm.
    #[instrument(skip(self, message), fields(exchange = %self.exchange, message_id = %message.message_id()))]
    pub async fn publish<M: Message>(&self, message: &M) -> Result<()> {
        let result = self.try_publish(message).await;
        match &result {
            Ok(()) => {
                metrics::message_published(&self.exchange);
                debug!("Message published");
            }
            Err(e) => {
                metrics::publish_failed(&self.exchange);
                warn!(error = %e, "Publish failed");
            }
        }
        result
    }

    async fn try_publish<M: Message>(&self, message: &M) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_timestamp(now_unix_seconds())
            .with_message_id(ShortString::from(message.message_id()))
            .with_content_type(ShortString::from(CONTENT_TYPE_JSON));

        // Hold the guard until the confirm arrives so a reconnect cannot
        // swap the channel mid-publish.
        let channel = self
            .connection
            .channel_guard()
            .await
            .map_err(|_| AmqpError::Publish("channel is not open".to_string()))?;

        let confirm = channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| AmqpError::Publish(e.to_string()))?;

        let confirmation = confirm
            .await
            .map_err(|e| AmqpError::Publish(e.to_string()))?;

        if confirmation.is_nack() {
            return Err(AmqpError::Publish("broker rejected the message".to_string()));
        }
        Ok(())
    }
}

fn now_unix_seconds() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
