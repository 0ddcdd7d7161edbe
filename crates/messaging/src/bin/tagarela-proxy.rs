//! tagarela-proxy — topic-filtered publish/subscribe switch.
//!
//! Servers connect PUB sockets to the frontend; clients (and the
//! servers' replica listeners) connect SUB sockets to the backend.
//! `[topic, payload]` frames are fanned out to every subscriber whose
//! subscription prefix matches the topic.
//!
//! # Usage
//!
//! ```bash
//! tagarela-proxy
//! tagarela-proxy --host 0.0.0.0 --frontend-port 5557 --backend-port 5558
//! ```

use std::sync::Arc;

use clap::Parser;
use tagarela_messaging::proxy::{TopicProxy, TopicProxyConfig};

/// Topic-filtered publish/subscribe switch.
#[derive(Parser, Debug)]
#[command(name = "tagarela-proxy", version, about)]
struct Cli {
    /// Host to bind both sockets on.
    #[arg(long, env = "TAGARELA_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Frontend port — publishers connect here.
    #[arg(long, env = "TAGARELA_PROXY_FRONTEND_PORT", default_value_t = 5557)]
    frontend_port: u16,

    /// Backend port — subscribers connect here.
    #[arg(long, env = "TAGARELA_PROXY_BACKEND_PORT", default_value_t = 5558)]
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
    tracing::info!(?cli, "starting tagarela-proxy");

    let config = TopicProxyConfig::tcp(&cli.host, cli.frontend_port, cli.backend_port);
    let proxy = Arc::new(TopicProxy::new(config));

    let proxy_for_signal = proxy.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        proxy_for_signal.shutdown();
    });

    if cli.metrics_interval > 0 {
        let metrics = proxy.metrics().clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(cli.metrics_interval));
            loop {
                interval.tick().await;
                let counts = metrics.topic_counts.lock().await;
                tracing::info!(
                    total_frames = metrics.total(),
                    unique_topics = counts.len(),
                    "proxy metrics"
                );
            }
        });
    }

    proxy.run().await?;

    tracing::info!("tagarela-proxy exited cleanly");
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
