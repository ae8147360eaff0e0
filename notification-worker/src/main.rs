//! Notifier Worker - RabbitMQ consumer that sends account notification emails.
//!
//! This worker consumes user-update events from the configured queue, sends
//! the matching SES template for each, and acks or requeues the message
//! depending on the outcome.

mod worker;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notifier::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("worker_starting");

    // Load configuration from environment
    let config = Config::from_env();
    tracing::info!(
        host = %config.broker.host,
        port = config.broker.port,
        queue = %config.broker.queue,
        threads = config.broker.threads,
        prefetch = config.broker.prefetch,
        message_delay_ms = config.broker.message_delay.as_millis() as u64,
        mail_from = %config.mail.from_address,
        mail_region = ?config.mail.region,
        "config_loaded"
    );

    worker::run(config).await?;

    Ok(())
}
