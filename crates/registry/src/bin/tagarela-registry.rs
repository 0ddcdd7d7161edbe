//! tagarela-registry — naming, ranking, and liveness service of record.
//!
//! Application servers register here on startup (`rank`), heartbeat
//! periodically, fetch the full map for coordinator election (`list`),
//! and sample the physical clock (`clock`).
//!
//! # Usage
//!
//! ```bash
//! tagarela-registry
//! tagarela-registry --port 6000 --data-file ./data/ref_servers.json
//! TAGARELA_REGISTRY_PORT=6001 tagarela-registry
//! ```

use clap::Parser;
use tagarela_messaging::Transport;
use tagarela_registry::RegistryService;

/// Centralized naming + ranking + liveness service.
#[derive(Parser, Debug)]
#[command(name = "tagarela-registry", version, about)]
struct Cli {
    /// Host to bind on.
    #[arg(long, env = "TAGARELA_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for the request/reply socket.
    #[arg(long, env = "TAGARELA_REGISTRY_PORT", default_value_t = 6000)]
    port: u16,

    /// Path of the persisted server map.
    #[arg(
        long,
        env = "TAGARELA_REGISTRY_DATA",
        default_value = "./data/ref_servers.json"
    )]
    data_file: String,
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
    tracing::info!(?cli, "starting tagarela-registry");

    let service = RegistryService::new(cli.data_file.clone());
    let transport = Transport::tcp(&cli.host, cli.port);

    service.run(&transport).await?;
    Ok(())
}
