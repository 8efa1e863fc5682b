//! In-process transport double for lifecycle and health tests.

use crate::error::{AmqpError, Result};
use crate::transport::{Session, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{mpsc, watch};

/// Transport whose `open` succeeds for the first `succeed_first` calls and
/// fails afterwards. The failure sender of the latest session is kept so
/// tests can simulate a dropped connection.
pub(crate) struct FakeTransport {
    opens: AtomicU32,
    succeed_first: u32,
    open_error: fn() -> AmqpError,
    healthy: AtomicBool,
    failure: std::sync::Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl FakeTransport {
    pub(crate) fn new(succeed_first: u32) -> Self {
        Self {
            opens: AtomicU32::new(0),
            succeed_first,
            open_error: || AmqpError::Connection("connection refused".to_string()),
            healthy: AtomicBool::new(false),
            failure: std::sync::Mutex::new(None),
        }
    }

    pub(crate) fn with_open_error(mut self, open_error: fn() -> AmqpError) -> Self {
        self.open_error = open_error;
        self
    }

    pub(crate) fn drop_connection(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        let sender = self.failure.lock().unwrap().take();
        sender.unwrap().send("connection reset".to_string()).unwrap();
    }

    pub(crate) fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self) -> Result<Session> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.succeed_first {
            return Err((self.open_error)());
        }

        let (failure_tx, failures) = mpsc::unbounded_channel();
        let (stop, mut stop_rx) = watch::channel(false);
        let worker = tokio::spawn(async move {
            let _ = stop_rx.wait_for(|stopped| *stopped).await;
        });

        *self.failure.lock().unwrap() = Some(failure_tx);
        self.healthy.store(true, Ordering::SeqCst);
        Ok(Session::new(failures, stop, worker))
    }

    async fn close(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
