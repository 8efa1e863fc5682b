//! Dead-letter exchange and queue for rejected messages.

use crate::error::Result;
use crate::topology::declare_error;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};
use tracing::info;

/// Fanout exchange plus a durable queue that collects everything the main
/// queue rejects without requeue.
#[derive(Debug, Clone)]
pub struct DeadLetterTopology {
    exchange: String,
    queue: String,
}

impl DeadLetterTopology {
    pub fn new(exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Declare the exchange, queue and binding. Idempotent.
    pub async fn declare(&self, channel: &Channel) -> Result<()> {
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| declare_error(format!("dead-letter exchange '{}'", self.exchange), e))?;

        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| declare_error(format!("dead-letter queue '{}'", self.queue), e))?;

        channel
            .queue_bind(
                &self.queue,
                &self.exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| declare_error("dead-letter binding".to_string(), e))?;

        info!(exchange = %self.exchange, queue = %self.queue, "Dead-letter topology declared");
        Ok(())
    }
}
