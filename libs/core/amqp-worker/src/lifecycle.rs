//! Start/stop orchestration and supervised reconnects.

use crate::config::ReconnectPolicy;
use crate::error::{AmqpError, Result};
use crate::metrics;
use crate::signals::shutdown_signal;
use crate::transport::{Session, Transport};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Consumer lifecycle state.
///
/// ```text
/// Stopped ─start─▶ Starting ─▶ Running ─failure─▶ Reconnecting ─▶ Running
///    ▲                 │                              │
///    └── start failed ─┘                              └─ attempts exhausted ─▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Reconnecting,
    /// Reconnect attempts exhausted; only a restart recovers.
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Reconnecting => "reconnecting",
            LifecycleState::Failed => "failed",
        }
    }

    pub(crate) fn as_gauge(&self) -> u8 {
        match self {
            LifecycleState::Stopped => 0,
            LifecycleState::Starting => 1,
            LifecycleState::Running => 2,
            LifecycleState::Reconnecting => 3,
            LifecycleState::Failed => 4,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the retry policy around a [`Transport`].
///
/// `start` is strict: any failure while connecting, declaring or subscribing
/// is returned to the caller. After that a supervisor task waits for the
/// session to fail and reconnects with a fixed delay, up to
/// `policy.max_attempts` times.
pub struct ConsumerLifecycle<T: Transport> {
    transport: Arc<T>,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<LifecycleState>>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> ConsumerLifecycle<T> {
    pub fn new(transport: Arc<T>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(LifecycleState::Stopped);
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            policy,
            state: Arc::new(state),
            shutdown,
            supervisor: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Running and the transport reports a healthy link.
    pub async fn is_healthy(&self) -> bool {
        self.state() == LifecycleState::Running && self.transport.is_healthy().await
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut supervisor = self.supervisor.lock().await;

        let current = self.state();
        if !matches!(current, LifecycleState::Stopped | LifecycleState::Failed) {
            return Err(AmqpError::InvalidState(format!(
                "cannot start while {current}"
            )));
        }

        set_state(&self.state, LifecycleState::Starting);
        let session = match self.transport.open().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Consumer failed to start");
                self.transport.close().await;
                set_state(&self.state, LifecycleState::Stopped);
                return Err(e);
            }
        };

        self.shutdown.send_replace(false);
        set_state(&self.state, LifecycleState::Running);

        *supervisor = Some(tokio::spawn(supervise(
            self.transport.clone(),
            self.policy.clone(),
            self.state.clone(),
            self.shutdown.subscribe(),
            session,
        )));

        info!("Consumer started");
        Ok(())
    }

    /// Stop consuming and close the transport. Safe to call in any state and
    /// more than once.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut supervisor = self.supervisor.lock().await;

        self.shutdown.send_replace(true);
        if let Some(task) = supervisor.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Supervisor task ended abnormally");
            }
        }

        self.transport.close().await;
        if self.state() != LifecycleState::Stopped {
            set_state(&self.state, LifecycleState::Stopped);
            info!("Consumer stopped");
        }
    }

    /// Stop when SIGINT or SIGTERM arrives.
    pub fn stop_on_signal(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = shutdown_signal().await {
                error!(error = %e, "Failed to listen for shutdown signals");
                return;
            }
            self.stop().await;
        })
    }
}

fn set_state(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
    state.send_replace(next);
    metrics::lifecycle_state(next);
}

/// Resolves once shutdown has been requested, including before the call.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

enum Reconnect {
    Recovered(Session),
    Shutdown,
    Exhausted,
}

async fn supervise<T: Transport>(
    transport: Arc<T>,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<LifecycleState>>,
    mut shutdown: watch::Receiver<bool>,
    mut session: Session,
) {
    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                session.shutdown().await;
                return;
            }
            reason = session.failed() => {
                warn!(%reason, "Broker session lost, reconnecting");
                session.shutdown().await;
                transport.close().await;
                set_state(&state, LifecycleState::Reconnecting);

                match reconnect(transport.as_ref(), &policy, &mut shutdown).await {
                    Reconnect::Recovered(next) => {
                        session = next;
                        set_state(&state, LifecycleState::Running);
                    }
                    Reconnect::Shutdown => return,
                    Reconnect::Exhausted => {
                        set_state(&state, LifecycleState::Failed);
                        error!(
                            max_attempts = policy.max_attempts,
                            "Reconnect attempts exhausted, consumer is no longer serving messages"
                        );
                        return;
                    }
                }
            }
        }
    }
}

async fn reconnect<T: Transport>(
    transport: &T,
    policy: &ReconnectPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> Reconnect {
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            _ = shutdown_requested(shutdown) => return Reconnect::Shutdown,
            _ = tokio::time::sleep(policy.delay) => {}
        }

        match transport.open().await {
            Ok(session) => {
                metrics::reconnect_attempt("success");
                info!(attempt, "Reconnected to broker");
                return Reconnect::Recovered(session);
            }
            Err(e) => {
                metrics::reconnect_attempt("failure");
                warn!(attempt, max_attempts = policy.max_attempts, error = %e, "Reconnect attempt failed");
                transport.close().await;
                if e.is_fatal() {
                    return Reconnect::Exhausted;
                }
            }
        }
    }

    Reconnect::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use std::time::Duration;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(10), max_attempts)
    }

    async fn wait_for_state(lifecycle: &ConsumerLifecycle<FakeTransport>, state: LifecycleState) {
        let mut rx = lifecycle.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn test_start_runs_and_reports_healthy() {
        let lifecycle = ConsumerLifecycle::new(Arc::new(FakeTransport::new(1)), policy(5));

        lifecycle.start().await.unwrap();

        assert_eq!(lifecycle.state(), LifecycleState::Running);
        assert!(lifecycle.is_healthy().await);
        lifecycle.stop().await;
    }

    #[tokio::test]
    async fn test_start_failure_is_fatal_and_not_retried() {
        let transport = Arc::new(FakeTransport::new(0));
        let lifecycle = ConsumerLifecycle::new(transport.clone(), policy(5));

        let err = lifecycle.start().await.unwrap_err();

        assert!(matches!(err, AmqpError::Connection(_)));
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert_eq!(transport.opens(), 1);
        assert!(!lifecycle.is_healthy().await);
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_after_max_attempts() {
        let transport = Arc::new(FakeTransport::new(1));
        let lifecycle = ConsumerLifecycle::new(transport.clone(), policy(3));
        lifecycle.start().await.unwrap();

        transport.drop_connection();
        wait_for_state(&lifecycle, LifecycleState::Failed).await;

        // Initial open plus exactly three reconnect attempts.
        assert_eq!(transport.opens(), 4);
        assert!(!lifecycle.is_healthy().await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.opens(), 4);
    }

    #[tokio::test]
    async fn test_reconnect_recovers() {
        let transport = Arc::new(FakeTransport::new(2));
        let lifecycle = ConsumerLifecycle::new(transport.clone(), policy(3));
        lifecycle.start().await.unwrap();

        transport.drop_connection();
        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.opens() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reconnect attempt");
        wait_for_state(&lifecycle, LifecycleState::Running).await;

        assert_eq!(transport.opens(), 2);
        assert!(lifecycle.is_healthy().await);
        lifecycle.stop().await;
    }

    #[tokio::test]
    async fn test_topology_conflict_during_reconnect_is_not_retried() {
        let transport = Arc::new(
            FakeTransport::new(1)
                .with_open_error(|| AmqpError::Topology("PRECONDITION_FAILED".to_string())),
        );
        let lifecycle = ConsumerLifecycle::new(transport.clone(), policy(5));
        lifecycle.start().await.unwrap();

        transport.drop_connection();
        wait_for_state(&lifecycle, LifecycleState::Failed).await;

        assert_eq!(transport.opens(), 2);
    }

    #[tokio::test]
    async fn test_channel_failure_during_reconnect_uses_every_attempt() {
        let transport = Arc::new(
            FakeTransport::new(1).with_open_error(|| {
                AmqpError::Channel("declaring exchange 'ussd_exchange': connection reset".to_string())
            }),
        );
        let lifecycle = ConsumerLifecycle::new(transport.clone(), policy(3));
        lifecycle.start().await.unwrap();

        transport.drop_connection();
        wait_for_state(&lifecycle, LifecycleState::Failed).await;

        assert_eq!(transport.opens(), 4);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let transport = Arc::new(FakeTransport::new(1));
        let lifecycle = ConsumerLifecycle::new(transport.clone(), policy(5));

        lifecycle.stop().await;
        lifecycle.start().await.unwrap();
        lifecycle.stop().await;
        lifecycle.stop().await;

        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(!lifecycle.is_healthy().await);
    }

    #[tokio::test]
    async fn test_stop_interrupts_reconnect() {
        let transport = Arc::new(FakeTransport::new(1));
        let lifecycle = ConsumerLifecycle::new(
            transport.clone(),
            ReconnectPolicy::new(Duration::from_secs(60), 5),
        );
        lifecycle.start().await.unwrap();

        transport.drop_connection();
        wait_for_state(&lifecycle, LifecycleState::Reconnecting).await;
        tokio::time::timeout(Duration::from_secs(1), lifecycle.stop())
            .await
            .expect("stop should not wait for the reconnect delay");

        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let lifecycle = ConsumerLifecycle::new(Arc::new(FakeTransport::new(2)), policy(5));
        lifecycle.start().await.unwrap();

        let err = lifecycle.start().await.unwrap_err();

        assert!(matches!(err, AmqpError::InvalidState(_)));
        lifecycle.stop().await;
    }
}
