//! Notifier Admin - template management API.
//!
//! This binary provides a small web server that lets administrators list,
//! inspect, create and delete the SES templates the worker sends. All
//! template routes require the admin bearer token.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notifier::web::{router, AppState};
use notifier::{shutdown, Config, SesClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("admin_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.admin.port,
        admin_token_configured = config.admin.api_token.is_some(),
        mail_region = ?config.mail.region,
        "config_loaded"
    );

    config
        .mail
        .validate()
        .context("Invalid mail configuration")?;

    let client = SesClient::from_settings(&config.mail).await;
    let state = AppState::new(config.admin.clone(), Arc::new(client));

    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.admin.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "admin_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown::os_signal().await;
            info!("admin_server_shutting_down");
        })
        .await
        .context("Server error")?;

    info!("admin_server_shutdown_complete");

    Ok(())
}
