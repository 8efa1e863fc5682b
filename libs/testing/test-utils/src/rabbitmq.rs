//! RabbitMQ test infrastructure
//!
//! Provides a `TestRabbitMq` helper that starts a RabbitMQ container.

use lapin::{Channel, Connection, ConnectionProperties};
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::rabbitmq::RabbitMq;

/// Test RabbitMQ wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
///
/// ```no_run
/// use test_utils::TestRabbitMq;
///
/// # async fn example() {
/// let rabbit = TestRabbitMq::new().await;
/// let (_connection, channel) = rabbit.channel().await;
/// # }
/// ```
pub struct TestRabbitMq {
    #[allow(dead_code)]
    container: ContainerAsync<RabbitMq>,
    pub host: String,
    pub port: u16,
    pub amqp_url: String,
}

impl TestRabbitMq {
    /// Start a broker with the default guest/guest credentials
    pub async fn new() -> Self {
        let container = RabbitMq::default()
            .start()
            .await
            .expect("Failed to start RabbitMQ container");

        let port = container
            .get_host_port_ipv4(5672)
            .await
            .expect("Failed to get AMQP port");

        let host = "127.0.0.1".to_string();
        let amqp_url = format!("amqp://guest:guest@{}:{}/%2f", host, port);

        tracing::info!(port, "Test RabbitMQ ready");

        Self {
            container,
            host,
            port,
            amqp_url,
        }
    }

    /// Open a fresh connection, independent of the code under test
    pub async fn connection(&self) -> Connection {
        Connection::connect(&self.amqp_url, ConnectionProperties::default())
            .await
            .expect("Failed to connect to RabbitMQ")
    }

    /// Open a fresh connection and a channel over it
    ///
    /// Keep the connection alive for as long as the channel is used.
    pub async fn channel(&self) -> (Connection, Channel) {
        let connection = self.connection().await;
        let channel = connection
            .create_channel()
            .await
            .expect("Failed to open channel");
        (connection, channel)
    }
}

impl Drop for TestRabbitMq {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test RabbitMQ container");
    }
}
