//! Single broker connection plus one channel.

use crate::config::BrokerConfig;
use crate::error::{AmqpError, Result};
use lapin::options::ConfirmSelectOptions;
use lapin::{Channel, Connection, ConnectionProperties};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};

const REPLY_SUCCESS: u16 = 200;

/// An open connection/channel pair.
///
/// `failed` flips once, either when lapin reports an error on the connection
/// or channel, or when we close the link ourselves. Only the first flip
/// notifies the failure callback.
struct Link {
    connection: Connection,
    channel: Channel,
    failed: Arc<AtomicBool>,
}

impl Link {
    fn is_open(&self) -> bool {
        !self.failed.load(Ordering::SeqCst)
            && self.connection.status().connected()
            && self.channel.status().connected()
    }

    async fn close(self) {
        self.failed.store(true, Ordering::SeqCst);

        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(REPLY_SUCCESS, "closing").await {
                debug!(error = %e, "Channel close failed");
            }
        }
        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(REPLY_SUCCESS, "closing").await {
                debug!(error = %e, "Connection close failed");
            }
        }
    }
}

/// Owns one physical connection and one channel to the broker.
///
/// The connection does not retry. Unexpected closure is reported to the
/// callback passed to [`connect`](Self::connect); deciding what to do about
/// it belongs to [`ConsumerLifecycle`](crate::ConsumerLifecycle).
///
/// The channel is guarded by an `RwLock`: publishers hold a read guard for
/// the duration of a publish, so (re)connect and close wait for in-flight
/// publishes instead of tearing the channel down underneath them.
pub struct BrokerConnection {
    url: String,
    connect_timeout: Duration,
    link: RwLock<Option<Link>>,
}

impl BrokerConnection {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            link: RwLock::new(None),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.amqp_url(), config.connect_timeout)
    }

    /// Open the connection and its channel (in publisher-confirm mode).
    ///
    /// Any previous link is closed first. `on_failure` fires at most once for
    /// this link, when the connection or channel errors out.
    #[instrument(skip(self, on_failure))]
    pub async fn connect<F>(&self, on_failure: F) -> Result<()>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let mut guard = self.link.write().await;
        if let Some(previous) = guard.take() {
            previous.close().await;
        }

        let connection = tokio::time::timeout(
            self.connect_timeout,
            Connection::connect(&self.url, ConnectionProperties::default()),
        )
        .await
        .map_err(|_| AmqpError::Timeout {
            operation: "connect",
            after: self.connect_timeout,
        })?
        .map_err(|e| AmqpError::Connection(e.to_string()))?;

        let channel = match open_channel(&connection).await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(REPLY_SUCCESS, "channel setup failed").await;
                return Err(e);
            }
        };

        let failed = Arc::new(AtomicBool::new(false));
        let notify: Arc<dyn Fn(String) + Send + Sync> = Arc::new(on_failure);

        {
            let failed = failed.clone();
            let notify = notify.clone();
            connection.on_error(move |err| {
                if !failed.swap(true, Ordering::SeqCst) {
                    warn!(error = %err, "Broker connection closed unexpectedly");
                    notify(format!("connection closed: {err}"));
                }
            });
        }
        {
            let failed = failed.clone();
            channel.on_error(move |err| {
                if !failed.swap(true, Ordering::SeqCst) {
                    warn!(error = %err, "Broker channel closed unexpectedly");
                    notify(format!("channel closed: {err}"));
                }
            });
        }

        *guard = Some(Link {
            connection,
            channel,
            failed,
        });

        info!("Connected to broker");
        Ok(())
    }

    /// True while both connection and channel are open and no failure has
    /// been reported since the last successful connect.
    pub async fn is_healthy(&self) -> bool {
        self.link.read().await.as_ref().is_some_and(Link::is_open)
    }

    /// Clone of the current channel, if it is usable.
    pub async fn channel(&self) -> Result<Channel> {
        Ok(self.channel_guard().await?.clone())
    }

    /// Read guard over the usable channel. Teardown waits until it is dropped.
    pub(crate) async fn channel_guard(&self) -> Result<RwLockReadGuard<'_, Channel>> {
        let guard = self.link.read().await;
        RwLockReadGuard::try_map(guard, |link| {
            link.as_ref()
                .filter(|link| link.is_open())
                .map(|link| &link.channel)
        })
        .map_err(|_| AmqpError::NotConnected)
    }

    /// Close the channel, then the connection. Calling it again is a no-op.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let link = self.link.write().await.take();
        if let Some(link) = link {
            link.close().await;
            info!("Broker connection closed");
        }
    }
}

async fn open_channel(connection: &Connection) -> Result<Channel> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| AmqpError::Channel(e.to_string()))?;

    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|e| AmqpError::Channel(e.to_string()))?;

    Ok(channel)
}
