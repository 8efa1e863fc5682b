//! Health endpoints for K8s probes.

use crate::lifecycle::{ConsumerLifecycle, LifecycleState};
use crate::transport::Transport;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use core_config::server::HealthServerConfig;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Probe response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub state: String,
    /// Liveness: false only when the process can no longer recover by itself.
    pub alive: bool,
    /// Readiness: consuming over a healthy broker link.
    pub ready: bool,
}

/// Source of health information for the probe endpoints.
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    async fn report(&self) -> HealthReport;
}

#[async_trait]
impl<T: Transport> HealthProbe for ConsumerLifecycle<T> {
    async fn report(&self) -> HealthReport {
        let state = self.state();
        let ready = self.is_healthy().await;
        let alive = state != LifecycleState::Failed;

        HealthReport {
            status: if ready {
                "healthy"
            } else if alive {
                "degraded"
            } else {
                "failed"
            },
            state: state.to_string(),
            alive,
            ready,
        }
    }
}

type SharedProbe = Arc<dyn HealthProbe>;

/// Serves `/health`, `/healthz`, `/ready`, `/readyz` and, when a handle is
/// attached, `/metrics`.
pub struct HealthServer {
    config: HealthServerConfig,
    probe: SharedProbe,
    metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, probe: SharedProbe) -> Self {
        Self {
            config,
            probe,
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(liveness_handler))
            .route("/healthz", get(liveness_handler))
            .route("/ready", get(readiness_handler))
            .route("/readyz", get(readiness_handler))
            .with_state(self.probe.clone());

        if let Some(handle) = self.metrics_handle.clone() {
            router = router.route(
                "/metrics",
                get(move || {
                    let handle = handle.clone();
                    async move { handle.render() }
                }),
            );
        }

        router
    }

    /// Serve until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), std::io::Error> {
        let router = self.router();
        let addr = self.config.address();

        info!(addr = %addr, "Starting health server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    }
}

/// Liveness: 503 once the consumer has given up reconnecting, so the
/// orchestrator restarts the pod. A transient broker outage stays 200.
async fn liveness_handler(State(probe): State<SharedProbe>) -> impl IntoResponse {
    let report = probe.report().await;
    let code = if report.alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

async fn readiness_handler(State(probe): State<SharedProbe>) -> impl IntoResponse {
    let report = probe.report().await;
    let code = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}
