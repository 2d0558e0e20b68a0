//! Relay Server - Entry Point
//!
//! Starts the registry and the HTTP server with graceful shutdown support.

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use relay::api::RelayServer;
use relay::{telemetry, Config, Registry, RelayError};

/// WebSocket chat relay
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Broadcast every chat message to all connected participants")]
struct Args {
    /// HTTP service address, overrides RELAY_ADDR (default 0.0.0.0:8888)
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> relay::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(addr) = args.addr {
        config = config.with_addr(addr);
    }

    telemetry::init(&config.log);
    info!("Starting relay server on {}", config.server.addr);

    let (shutdown_tx, _) = watch::channel(false);

    // Bind before starting anything so a bad address fails the process
    let (registry, handle) = Registry::new(config.intake_buffer);
    let server = RelayServer::new(config.server.clone(), config.connection.clone(), handle);
    let listener = server.bind().await?;

    // Start the registry
    let registry_task = tokio::spawn(registry.run(shutdown_tx.subscribe()));

    // Start the HTTP server
    let server_shutdown = shutdown_tx.subscribe();
    let mut server_task =
        tokio::spawn(async move { server.serve(listener, server_shutdown).await });

    // Wait for a shutdown signal, or for the server to stop on its own
    let early_exit = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            None
        }
        joined = &mut server_task => Some(joined),
    };
    let stopped_early = early_exit.is_some();

    let _ = shutdown_tx.send(true);

    let joined = match early_exit {
        Some(joined) => joined,
        None => server_task.await,
    };
    let server_result = joined
        .map_err(|e| RelayError::Internal(format!("server task failed: {}", e)))
        .and_then(|result| result);
    let _ = registry_task.await;

    if let Err(e) = &server_result {
        error!("Relay server error: {}", e);
    }
    if stopped_early {
        server_result?;
        return Err(RelayError::Internal(
            "server stopped before shutdown was requested".into(),
        ));
    }

    info!("Relay server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
