//! tagarela-server — stateful chat application server.
//!
//! Serves client commands from the broker backend, fans broadcasts and
//! direct messages out through the proxy, replays peer write-logs from
//! the `replica` topic, and coordinates through the registry: rank on
//! startup, heartbeats, periodic clock sync, and lowest-rank election.
//!
//! # Usage
//!
//! ```bash
//! tagarela-server --name srv1
//! TAGARELA_SERVER_NAME=srv2 TAGARELA_DATA_DIR=./data/srv2 tagarela-server
//! ```

use clap::Parser;
use tagarela_server::{ChatServer, ServerConfig};
use tagarela_messaging::Transport;

/// Stateful chat application server.
#[derive(Parser, Debug)]
#[command(name = "tagarela-server", version, about)]
struct Cli {
    /// Unique server name (also the origin stamped on records).
    #[arg(long, env = "TAGARELA_SERVER_NAME")]
    name: String,

    /// Directory for registry.json and the append-only logs.
    #[arg(long, env = "TAGARELA_DATA_DIR", default_value = "./data")]
    data_dir: String,

    /// Broker backend endpoint to serve requests from.
    #[arg(
        long,
        env = "TAGARELA_BROKER_BACKEND",
        default_value = "tcp://127.0.0.1:5556"
    )]
    broker_backend: String,

    /// Proxy endpoint publishers connect to.
    #[arg(
        long,
        env = "TAGARELA_PROXY_FRONTEND",
        default_value = "tcp://127.0.0.1:5557"
    )]
    proxy_frontend: String,

    /// Proxy endpoint subscribers connect to.
    #[arg(
        long,
        env = "TAGARELA_PROXY_BACKEND",
        default_value = "tcp://127.0.0.1:5558"
    )]
    proxy_backend: String,

    /// Registry endpoint.
    #[arg(
        long,
        env = "TAGARELA_REGISTRY_ENDPOINT",
        default_value = "tcp://127.0.0.1:6000"
    )]
    registry: String,

    /// Seconds between heartbeats.
    #[arg(long, env = "TAGARELA_HEARTBEAT_INTERVAL", default_value_t = 5)]
    heartbeat_interval: u64,

    /// Re-sync with the registry every N handled requests.
    #[arg(long, env = "TAGARELA_SYNC_EVERY", default_value_t = 10)]
    sync_every: u64,
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
    tracing::info!(?cli, "starting tagarela-server");

    let config = ServerConfig {
        name: cli.name,
        data_dir: cli.data_dir.into(),
        broker_backend: Transport::parse(&cli.broker_backend)?,
        proxy_frontend: Transport::parse(&cli.proxy_frontend)?,
        proxy_backend: Transport::parse(&cli.proxy_backend)?,
        registry: Transport::parse(&cli.registry)?,
        heartbeat_interval: std::time::Duration::from_secs(cli.heartbeat_interval),
        sync_every: cli.sync_every,
        request_timeout: std::time::Duration::from_secs(5),
    };

    ChatServer::new(config).run().await?;
    Ok(())
}
