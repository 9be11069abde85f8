//! Concierge server entry point.
//!
//! Binary name: `concierge`
//!
//! Parses CLI options, loads config, wires the engine stack, spawns the
//! background mailbox poller, and serves the HTTP API until ctrl-c or
//! SIGTERM. Shutdown cancels the poller between ticks, so no tick is
//! ever cut off mid-run.

mod config;
mod http;
mod state;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::{Cli, Config};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    concierge_observe::tracing_setup::init_tracing(cli.log_directives(), cli.otel)
        .map_err(|err| anyhow::anyhow!("tracing setup failed: {err}"))?;

    let config = Config::load(&cli)?;
    let (app_state, poller) = AppState::init(&config)?;

    let cancel = CancellationToken::new();
    let poller_handle = poller.map(|poller| poller.spawn(cancel.clone()));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "concierge api listening");

    let router = http::router::build_router(app_state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(handle) = poller_handle {
        handle.await?;
    }

    concierge_observe::tracing_setup::shutdown_tracing();
    info!("server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
