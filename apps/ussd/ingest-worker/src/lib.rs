//! USSD Ingest Worker
//!
//! Turns loan application events from the USSD channel into durable,
//! deduplicated records.
//!
//! ## Architecture
//!
//! ```text
//! RabbitMQ (ussd_exchange ──loan.application──▶ ussd_loan_applications)
//!   ↓ (prefetch 1, manual ack)
//! ConsumerLifecycle ─▶ AmqpTransport ─▶ MessageConsumer<InboundMessage, IngestionHandler>
//!   ↓ (dedup by messageId / referenceNumber / loanApplicationUssdId)
//! ApplicationService<PgApplicationStore>
//!   ↓
//! PostgreSQL (loan_applications)
//! ```
//!
//! The health server exposes liveness (`/healthz`), readiness (`/readyz`) and
//! Prometheus metrics (`/metrics`).

pub mod config;

use amqp_worker::{
    init_metrics, AmqpTransport, BrokerConnection, ConsumerLifecycle, HealthServer,
    MessageConsumer, Processor, TopologyInitializer,
};
use core_config::{Environment, FromEnv};
use domain_loan_applications::{
    ApplicationService, IngestionHandler, PgApplicationStore, PgTenantResolver,
};
use eyre::{eyre, Result, WrapErr};
use migration::Migrator;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

pub use config::IngestConfig;

const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Run the ingest worker until SIGINT/SIGTERM.
///
/// Startup failures (configuration, database, unknown tenant, broker
/// unreachable, topology conflict) are returned. Once running, broker
/// outages are handled by the lifecycle's bounded reconnect; if that gives
/// up, the process keeps serving a failing liveness probe.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let metrics_handle = init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    let config = IngestConfig::from_env().wrap_err("Failed to load configuration")?;
    info!(
        app = APP_NAME,
        version = env!("CARGO_PKG_VERSION"),
        tenant = %config.tenant_slug,
        broker = %config.broker.redacted_url(),
        queue = %config.broker.topology.queue,
        "Starting USSD ingest worker"
    );

    let db = database::connect_with_retry(config.database.clone(), config.database_retry.clone())
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    database::check_health(&db)
        .await
        .wrap_err("PostgreSQL health check failed")?;

    if config.run_migrations {
        database::run_migrations::<Migrator>(&db, APP_NAME)
            .await
            .wrap_err("Failed to run migrations")?;
    }

    let service = ApplicationService::new(PgApplicationStore::new(db.clone()));
    let handler = IngestionHandler::new(
        service,
        Arc::new(PgTenantResolver::new(db)),
        config.tenant_slug.clone(),
    );

    // Every message would be rejected without a tenant to own it
    let tenant_ready = handler
        .health_check()
        .await
        .map_err(|e| eyre!("Tenant lookup failed: {e}"))?;
    if !tenant_ready {
        return Err(eyre!(
            "No active tenant with slug '{}'",
            config.tenant_slug
        ));
    }

    let connection = Arc::new(BrokerConnection::from_config(&config.broker));
    let consumer = MessageConsumer::new(
        Arc::new(handler),
        &config.broker.topology.queue,
        config.broker.handler_timeout,
    );
    let transport = AmqpTransport::new(
        connection,
        TopologyInitializer::new(config.broker.topology.clone()),
        consumer,
    );
    let lifecycle = Arc::new(ConsumerLifecycle::new(
        Arc::new(transport),
        config.broker.reconnect.clone(),
    ));

    lifecycle
        .start()
        .await
        .wrap_err("Failed to start the loan application consumer")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let health_server =
        HealthServer::new(config.health.clone(), lifecycle.clone()).with_metrics(metrics_handle);
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run(shutdown_rx).await {
            error!(error = %e, "Health server failed");
        }
    });

    lifecycle
        .clone()
        .stop_on_signal()
        .await
        .wrap_err("Shutdown task panicked")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = health_task.await {
        error!(error = %e, "Health server task ended abnormally");
    }

    info!("USSD ingest worker stopped");
    Ok(())
}
