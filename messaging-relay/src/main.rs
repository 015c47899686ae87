//! Messaging Relay web server.
//!
//! Serves the outbound send API for the Hub and receives WhatsApp webhooks,
//! forwarding normalized events back to the Hub.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("relay_starting");

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        port = config.port,
        sending_configured = config.sending_enabled(),
        verify_token_configured = config.whatsapp_verify_token.is_some(),
        app_secret_configured = config.whatsapp_app_secret.is_some(),
        hub_configured = config.hub_webhook_url.is_some(),
        api_base_url = %config.whatsapp_api_base_url,
        rate_limit_per_hour = config.rate_limit_per_hour,
        rate_limit_per_day = config.rate_limit_per_day,
        "config_loaded"
    );

    if config.whatsapp_app_secret.is_none() {
        warn!("webhook_disabled_no_app_secret");
    }
    if config.hub_webhook_url.is_none() {
        warn!("hub_forwarding_disabled");
    }

    let port = config.port;
    let state = AppState::new(config).context("Failed to build HTTP clients")?;

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("relay_shutdown_complete");

    Ok(())
}

/// Completes when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_shutting_down");
}
