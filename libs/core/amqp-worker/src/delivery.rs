//! Abstraction over a single broker delivery.

use crate::error::{AmqpError, Result};
use async_trait::async_trait;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use messaging::Disposition;

/// One message handed to the consumer, together with the means to settle it.
#[async_trait]
pub trait InboundDelivery: Send + 'static {
    /// Raw message body.
    fn payload(&self) -> &[u8];

    /// Broker-level message id property, when the publisher set one.
    fn message_id(&self) -> Option<String>;

    fn redelivered(&self) -> bool;

    /// Ack, nack-with-requeue or reject-without-requeue.
    async fn settle(self, disposition: Disposition) -> Result<()>;
}

#[async_trait]
impl InboundDelivery for Delivery {
    fn payload(&self) -> &[u8] {
        &self.data
    }

    fn message_id(&self) -> Option<String> {
        self.properties.message_id().as_ref().map(|id| id.as_str().to_string())
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn settle(self, disposition: Disposition) -> Result<()> {
        let result = match disposition {
            Disposition::Ack => self.ack(BasicAckOptions::default()).await,
            Disposition::Requeue => {
                self.nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
            }
            Disposition::Reject => self.reject(BasicRejectOptions { requeue: false }).await,
        };

        result.map_err(|e| AmqpError::Consumer(format!("{disposition} failed: {e}")))
    }
}
