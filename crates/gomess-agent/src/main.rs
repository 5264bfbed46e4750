//! `gomess` binary: loads settings, starts the gateway, and drains it on
//! SIGINT or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use gomess_auth::AuthResolver;
use gomess_core::{InMemoryUserDirectory, SystemClock};
use gomess_server::{GatewayServer, ServerConfig, ShutdownOutcome};
use gomess_settings::GatewaySettings;

/// GoMess message gateway.
#[derive(Parser, Debug)]
#[command(name = "gomess", about = "GoMess is a simple messaging service")]
struct Cli {
    /// Path to a JSON settings file.
    #[arg(long, env = "GOMESS_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter such as `info` or `gomess_server=debug`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<GatewaySettings> {
        let mut settings = match &self.config {
            Some(path) => gomess_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => gomess_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.api.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.api.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    gomess_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let auth = AuthResolver::from_settings(&settings.jwt, Arc::new(SystemClock))
        .context("Failed to build JWT keyring")?;
    let users = Arc::new(InMemoryUserDirectory::new());

    let mut server = GatewayServer::new(ServerConfig::from(&settings), Arc::new(auth), users);
    match gomess_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder not installed"),
    }

    let addr = settings.api.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let handle = server.serve(listener).context("Failed to start server")?;

    tracing::info!(
        "GoMess listening on http://{} (grace period {:?})",
        handle.local_addr(),
        server.config().grace_period
    );

    wait_for_signal().await?;

    tracing::info!("Shutting down...");
    match server.graceful_shutdown(handle).await {
        ShutdownOutcome::Drained { elapsed } => {
            tracing::info!(?elapsed, "Shutdown complete");
        }
        ShutdownOutcome::GraceElapsed {
            forced_connections,
            elapsed,
        } => {
            tracing::warn!(
                forced_connections,
                ?elapsed,
                "Shutdown complete after grace period"
            );
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}
