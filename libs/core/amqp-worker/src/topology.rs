//! Exchange, queue and binding declaration.

use crate::config::TopologyConfig;
use crate::dlq::DeadLetterTopology;
use crate::error::{AmqpError, Result};
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{Channel, ExchangeKind};
use tracing::{info, instrument};

pub const ARG_MESSAGE_TTL: &str = "x-message-ttl";
pub const ARG_MAX_LENGTH: &str = "x-max-length";
pub const ARG_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Snapshot of a declared queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// Declares the durable direct exchange, the bounded durable queue and the
/// binding between them.
///
/// Safe to run after every reconnect. A declaration that conflicts with an
/// existing definition (different TTL on the same queue name, say) fails
/// with [`AmqpError::Topology`]; the broker also closes the channel in that
/// case.
#[derive(Debug, Clone)]
pub struct TopologyInitializer {
    config: TopologyConfig,
}

impl TopologyInitializer {
    pub fn new(config: TopologyConfig) -> Self {
        Self { config }
    }

    fn dead_letter(&self) -> Option<DeadLetterTopology> {
        self.config
            .dead_letter_exchange
            .as_ref()
            .map(|exchange| DeadLetterTopology::new(exchange, self.config.dead_letter_queue()))
    }

    /// Queue arguments: TTL and max length, plus the DLX when configured.
    pub fn queue_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            ShortString::from(ARG_MESSAGE_TTL),
            AMQPValue::LongInt(clamp_i32(self.config.message_ttl_ms)),
        );
        args.insert(
            ShortString::from(ARG_MAX_LENGTH),
            AMQPValue::LongInt(clamp_i32(self.config.max_length)),
        );
        if let Some(exchange) = &self.config.dead_letter_exchange {
            args.insert(
                ShortString::from(ARG_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(exchange.clone())),
            );
        }
        args
    }

    #[instrument(skip_all, fields(exchange = %self.config.exchange, queue = %self.config.queue))]
    pub async fn declare(&self, channel: &Channel) -> Result<QueueInfo> {
        if let Some(dead_letter) = self.dead_letter() {
            dead_letter.declare(channel).await?;
        }

        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| declare_error(format!("exchange '{}'", self.config.exchange), e))?;

        let queue = channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                self.queue_arguments(),
            )
            .await
            .map_err(|e| declare_error(format!("queue '{}'", self.config.queue), e))?;

        channel
            .queue_bind(
                &self.config.queue,
                &self.config.exchange,
                &self.config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                declare_error(
                    format!(
                        "binding '{}' -> '{}' ({})",
                        self.config.exchange, self.config.queue, self.config.routing_key
                    ),
                    e,
                )
            })?;

        let info = QueueInfo {
            name: queue.name().to_string(),
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
        };

        info!(
            routing_key = %self.config.routing_key,
            messages = info.message_count,
            consumers = info.consumer_count,
            "Topology declared"
        );
        Ok(info)
    }

    /// Passive declare: current depth and consumer count without changing
    /// anything.
    pub async fn inspect(&self, channel: &Channel) -> Result<QueueInfo> {
        let queue = channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| AmqpError::Channel(format!("inspect '{}': {}", self.config.queue, e)))?;

        Ok(QueueInfo {
            name: queue.name().to_string(),
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
        })
    }
}

/// Only a 406 PRECONDITION_FAILED conflicts with an existing definition.
/// Any other declare failure is a channel failure and stays retryable.
pub(crate) fn declare_error(what: String, err: lapin::Error) -> AmqpError {
    match &err {
        lapin::Error::ProtocolError(amqp)
            if matches!(
                amqp.kind(),
                AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
            ) =>
        {
            AmqpError::Topology(format!("{what}: {err}"))
        }
        _ => AmqpError::Channel(format!("declaring {what}: {err}")),
    }
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::protocol::{AMQPError, AMQPHardError};

    fn arg<'a>(args: &'a FieldTable, key: &str) -> Option<&'a AMQPValue> {
        args.inner().get(&ShortString::from(key))
    }

    #[test]
    fn test_default_queue_arguments() {
        let topology = TopologyInitializer::new(TopologyConfig::default());
        let args = topology.queue_arguments();

        assert_eq!(args.inner().len(), 2);
        assert_eq!(
            arg(&args, ARG_MESSAGE_TTL),
            Some(&AMQPValue::LongInt(3_600_000))
        );
        assert_eq!(arg(&args, ARG_MAX_LENGTH), Some(&AMQPValue::LongInt(10_000)));
        assert!(arg(&args, ARG_DEAD_LETTER_EXCHANGE).is_none());
    }

    #[test]
    fn test_dead_letter_argument() {
        let topology = TopologyInitializer::new(
            TopologyConfig::default().with_dead_letter_exchange("ussd_dlx"),
        );
        let args = topology.queue_arguments();

        assert_eq!(
            arg(&args, ARG_DEAD_LETTER_EXCHANGE),
            Some(&AMQPValue::LongString(LongString::from("ussd_dlx".to_string())))
        );
        let dead_letter = topology.dead_letter().unwrap();
        assert_eq!(dead_letter.exchange(), "ussd_dlx");
        assert_eq!(dead_letter.queue(), "ussd_loan_applications.dlq");
    }

    #[test]
    fn test_precondition_failed_is_a_conflict() {
        let err = lapin::Error::ProtocolError(AMQPError::new(
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED),
            ShortString::from("inequivalent arg 'x-message-ttl'"),
        ));

        let mapped = declare_error("queue 'ussd_loan_applications'".to_string(), err);

        assert!(matches!(mapped, AmqpError::Topology(_)));
        assert!(mapped.is_fatal());
    }

    #[test]
    fn test_transport_failures_while_declaring_are_retryable() {
        let io = lapin::Error::IOError(std::sync::Arc::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )));
        let mapped = declare_error("exchange 'ussd_exchange'".to_string(), io);
        assert!(matches!(mapped, AmqpError::Channel(_)));
        assert!(!mapped.is_fatal());

        let forced = lapin::Error::ProtocolError(AMQPError::new(
            AMQPErrorKind::Hard(AMQPHardError::CONNECTIONFORCED),
            ShortString::from("broker shutting down"),
        ));
        assert!(!declare_error("queue 'q'".to_string(), forced).is_fatal());

        let not_found = lapin::Error::ProtocolError(AMQPError::new(
            AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND),
            ShortString::from("no exchange"),
        ));
        assert!(!declare_error("binding".to_string(), not_found).is_fatal());
    }

    #[test]
    fn test_oversized_values_are_clamped() {
        assert_eq!(clamp_i32(u32::MAX), i32::MAX);
        assert_eq!(clamp_i32(42), 42);
    }
}
