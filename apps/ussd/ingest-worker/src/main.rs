//! USSD Ingest Worker - Entry Point
//!
//! Consumes loan application events from RabbitMQ into PostgreSQL.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    core_config::tracing::install_color_eyre();
    ussd_ingest_worker::run().await
}
