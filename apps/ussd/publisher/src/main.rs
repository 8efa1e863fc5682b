//! USSD Publisher
//!
//! Publishes loan application events to the ingestion exchange. Reads JSON
//! files (or stdin), validates every application before anything is sent,
//! then publishes each one with a broker confirm.

use amqp_worker::{BrokerConfig, BrokerConnection, MessagePublisher, TopologyInitializer};
use clap::Parser;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use eyre::{Result, WrapErr};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod batch;

#[derive(Parser)]
#[command(name = "ussd-publisher")]
#[command(about = "Publish USSD loan application events to RabbitMQ")]
struct Cli {
    /// JSON files holding one application or an array of them. Reads stdin when omitted.
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Validate the input without connecting to the broker
    #[arg(long)]
    dry_run: bool,

    /// Skip declaring the exchange and queue before publishing
    #[arg(long)]
    no_declare: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();

    let mut messages = Vec::new();
    if cli.files.is_empty() {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .wrap_err("Failed to read stdin")?;
        messages.extend(batch::parse_batch(&input).wrap_err("Invalid input on stdin")?);
    } else {
        for path in &cli.files {
            let input = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
            messages.extend(
                batch::parse_batch(&input)
                    .wrap_err_with(|| format!("Invalid input in {}", path.display()))?,
            );
        }
    }

    info!(count = messages.len(), "Loaded loan applications");
    if cli.dry_run {
        return Ok(());
    }

    let config = BrokerConfig::from_env().wrap_err("Failed to load broker configuration")?;
    info!(broker = %config.redacted_url(), exchange = %config.topology.exchange, "Connecting");

    let connection = Arc::new(BrokerConnection::from_config(&config));
    connection
        .connect(|_| {})
        .await
        .wrap_err("Failed to connect to RabbitMQ")?;

    if !cli.no_declare {
        let channel = connection.channel().await?;
        TopologyInitializer::new(config.topology.clone())
            .declare(&channel)
            .await
            .wrap_err("Failed to declare topology")?;
    }

    let publisher = MessagePublisher::new(
        connection.clone(),
        &config.topology.exchange,
        &config.topology.routing_key,
    );
    for message in &messages {
        publisher
            .publish(message)
            .await
            .wrap_err_with(|| format!("Failed to publish {}", message.message_id))?;
        info!(
            message_id = %message.message_id,
            reference_number = %message.reference_number,
            "Published"
        );
    }

    connection.close().await;
    info!(count = messages.len(), "Done");
    Ok(())
}
