//! httpmeter gateway
//!
//! Serves `/healthz`, `/readyz` and the Prometheus scrape endpoint behind the
//! request metrics middleware.
//!
//! Usage: `httpmeter-gateway [config.yaml]` (default `httpmeter.yaml`; built-in
//! defaults are used when that default file does not exist).

use std::path::Path;

use tokio::signal;
use tracing_subscriber::{fmt, EnvFilter};

use httpmeter_core::error::{MeterError, Result};
use httpmeter_gateway::{app_state::AppState, config, router};

const DEFAULT_CONFIG: &str = "httpmeter.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => config::load_from_file(&path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_from_file(DEFAULT_CONFIG)?,
        None => {
            tracing::info!("no config file, using defaults");
            config::GatewayConfig::default()
        }
    };
    let listen = cfg.gateway.listen_addr()?;

    let state = AppState::new(cfg);
    let app = router::build_router(state.clone());

    tracing::info!(
        %listen,
        endpoint = %state.cfg().metrics.endpoint,
        path_label = ?state.cfg().metrics.path_label,
        "httpmeter-gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(listen).await?;

    let draining = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            draining.set_draining();
            tracing::info!("shutdown signal received, draining");
        })
        .await
        .map_err(|e| MeterError::Internal(format!("server failed: {e}")))?;

    tracing::info!("httpmeter-gateway stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM. If a handler cannot be installed, that source
/// is treated as never firing.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
