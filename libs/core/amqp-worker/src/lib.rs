//! AMQP (RabbitMQ) consumer framework.
//!
//! Consumes JSON messages from a bounded durable queue with prefetch 1 and
//! manual acknowledgment, hands them to a [`messaging::Processor`], and keeps
//! the subscription alive across broker outages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐    ┌────────────────────────────┐    ┌──────────────────┐
//! │ MessagePublisher │───▶│ direct exchange ──▶ queue  │───▶│ MessageConsumer  │
//! └──────────────────┘    │ (ttl, max-length, [dlx])   │    │  └─▶ Processor   │
//!          │              └────────────────────────────┘    └──────────────────┘
//!          │                                                         ▲
//!          └──────────────▶ BrokerConnection ◀── AmqpTransport ──────┘
//!                                  │                  ▲
//!                          failure callback           │ open / close
//!                                  ▼                  │
//!                          ConsumerLifecycle (supervisor, bounded reconnect)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let config = BrokerConfig::from_env()?;
//! let connection = Arc::new(BrokerConnection::from_config(&config));
//! let consumer = MessageConsumer::new(Arc::new(processor), &config.topology.queue, config.handler_timeout);
//! let transport = AmqpTransport::new(connection, TopologyInitializer::new(config.topology.clone()), consumer);
//!
//! let lifecycle = Arc::new(ConsumerLifecycle::new(Arc::new(transport), config.reconnect.clone()));
//! lifecycle.start().await?;
//! lifecycle.clone().stop_on_signal().await?;
//! ```

mod config;
mod connection;
mod consumer;
mod delivery;
mod dlq;
mod error;
mod health;
mod lifecycle;
pub mod metrics;
mod producer;
mod signals;
#[cfg(test)]
mod testing;
mod topology;
mod transport;

pub use config::{
    BrokerConfig, ReconnectPolicy, TopologyConfig, DEFAULT_EXCHANGE, DEFAULT_MAX_LENGTH,
    DEFAULT_MESSAGE_TTL_MS, DEFAULT_QUEUE, DEFAULT_ROUTING_KEY, PREFETCH_COUNT,
};
pub use connection::BrokerConnection;
pub use consumer::{ConsumeExit, MessageConsumer};
pub use delivery::InboundDelivery;
pub use dlq::DeadLetterTopology;
pub use error::{AmqpError, Result};
pub use health::{HealthProbe, HealthReport, HealthServer};
pub use lifecycle::{ConsumerLifecycle, LifecycleState};
pub use metrics::{init_metrics, ConsumerMetrics};
pub use producer::MessagePublisher;
pub use signals::shutdown_signal;
pub use topology::{QueueInfo, TopologyInitializer};
pub use transport::{AmqpTransport, Session, Transport};

// Re-export from messaging
pub use messaging::{Disposition, ErrorCategory, Message, ProcessingError, Processor};
