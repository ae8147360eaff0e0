//! Worker lifecycle: connect, consume until shutdown, tear down.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use notifier::mail::{Dispatcher, SesClient};
use notifier::queue::{self, ConsumerSettings, MessageConsumer};
use notifier::{shutdown, Config};

/// Run the consumer until SIGINT/SIGTERM or a fatal consumption error.
///
/// The broker connection is closed exactly once on every exit path after
/// it was opened.
pub async fn run(config: Config) -> Result<()> {
    config
        .mail
        .validate()
        .context("Invalid mail configuration")?;
    config
        .broker
        .validate()
        .context("Invalid RabbitMQ configuration")?;

    let client = SesClient::from_settings(&config.mail).await;
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(client)));

    let connection = queue::connect(&config.broker)
        .await
        .context("Failed to connect to RabbitMQ")?;

    let consumer = MessageConsumer::new(
        ConsumerSettings::from(&config.broker),
        dispatcher,
        Arc::new(connection.channel().clone()),
    );

    let deliveries = match consumer.subscribe(connection.channel()).await {
        Ok(deliveries) => deliveries,
        Err(e) => {
            connection.close().await;
            return Err(e).context("Failed to start consumer");
        }
    };

    let (handle, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        shutdown::os_signal().await;
        info!("worker_stopping");
        handle.trigger();
    });

    info!("worker_ready");

    let result = consumer.run(deliveries, shutdown).await;

    connection.close().await;

    match result {
        Ok(summary) => {
            info!(
                received = summary.received,
                acked = summary.acked,
                requeued = summary.requeued,
                cancelled = summary.cancelled,
                "worker_shutdown_complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "worker_consumption_failed");
            Err(e).context("Consumer stopped unexpectedly")
        }
    }
}
