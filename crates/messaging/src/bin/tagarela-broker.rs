//! tagarela-broker — identity-preserving request/reply router.
//!
//! Clients connect DEALER sockets to the frontend; application servers
//! connect DEALER sockets to the backend. Each request is forwarded to
//! one server, round-robin, and the reply is routed back to the client
//! that sent it.
//!
//! # Usage
//!
//! ```bash
//! tagarela-broker
//! tagarela-broker --host 0.0.0.0 --frontend-port 5555 --backend-port 5556
//! TAGARELA_BROKER_FRONTEND_PORT=7555 tagarela-broker
//! ```

use std::sync::Arc;

use clap::Parser;
use tagarela_messaging::broker::{RequestBroker, RequestBrokerConfig};

/// Identity-preserving request/reply router between clients and servers.
#[derive(Parser, Debug)]
#[command(name = "tagarela-broker", version, about)]
struct Cli {
    /// Host to bind both sockets on.
    #[arg(long, env = "TAGARELA_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Frontend port — clients connect here.
    #[arg(long, env = "TAGARELA_BROKER_FRONTEND_PORT", default_value_t = 5555)]
    frontend_port: u16,

    /// Backend port — servers connect here.
    #[arg(long, env = "TAGARELA_BROKER_BACKEND_PORT", default_value_t = 5556)]
    backend_port: u16,

    /// Interval in seconds between metrics log lines (0 = disabled).
    #[arg(long, env = "TAGARELA_METRICS_INTERVAL", default_value_t = 30)]
    metrics_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting tagarela-broker");

    let config = RequestBrokerConfig::tcp(&cli.host, cli.frontend_port, cli.backend_port);
    let broker = Arc::new(RequestBroker::new(config));

    let broker_for_signal = broker.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        broker_for_signal.shutdown();
    });

    if cli.metrics_interval > 0 {
        let metrics = broker.metrics().clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(cli.metrics_interval));
            loop {
                interval.tick().await;
                tracing::info!(
                    requests = metrics.requests_total(),
                    replies = metrics.replies_total(),
                    "broker metrics"
                );
            }
        });
    }

    broker.run().await?;

    tracing::info!("tagarela-broker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
