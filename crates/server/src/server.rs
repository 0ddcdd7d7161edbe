//! The application server: wiring, startup sequence, and the main
//! request loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tagarela_messaging::{
    topics, BackendSocket, CommandHandler, Envelope, FrameSubscriber, Payload, Publisher,
    RequestClient, Subscriber, Transport,
};
use tracing::{info, warn};

use crate::coordination::{run_heartbeat, Coordination};
use crate::handlers;
use crate::replica::run_replica_listener;
use crate::state::ServerCore;
use crate::ServerError;

/// Everything a server instance needs to join the federation.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Unique server name; also the `origin` on every record produced.
    pub name: String,
    /// Directory holding `registry.json` and the two log files.
    pub data_dir: PathBuf,
    /// Broker backend to serve client requests from.
    pub broker_backend: Transport,
    /// Proxy endpoint publishers connect to.
    pub proxy_frontend: Transport,
    /// Proxy endpoint subscribers connect to (for the replica listener).
    pub proxy_backend: Transport,
    /// Registry request endpoint.
    pub registry: Transport,
    /// Seconds between heartbeats.
    pub heartbeat_interval: Duration,
    /// Re-sync with the registry every this many handled requests.
    pub sync_every: u64,
    /// Timeout for registry exchanges.
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Standard endpoints on localhost, for one-machine deployments.
    pub fn local(name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data_dir: data_dir.into(),
            broker_backend: Transport::tcp("127.0.0.1", 5556),
            proxy_frontend: Transport::tcp("127.0.0.1", 5557),
            proxy_backend: Transport::tcp("127.0.0.1", 5558),
            registry: Transport::tcp("127.0.0.1", 6000),
            heartbeat_interval: Duration::from_secs(5),
            sync_every: 10,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// A stateful chat server: command dispatch on the broker backend,
/// pub/sub emission through the proxy, replica ingestion from peers,
/// and registry-backed coordination.
pub struct ChatServer {
    config: ServerConfig,
}

impl ChatServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Start all loops and serve until the broker socket fails.
    ///
    /// Startup order: open persistent state (seeding defaults), connect
    /// the sockets, obtain a rank, log the known peer map, then begin
    /// serving. The first election waits for the first sync tick.
    pub async fn run(self) -> Result<(), ServerError> {
        let config = self.config;
        let core = Arc::new(ServerCore::open(config.name.as_str(), &config.data_dir)?);

        let publisher = Arc::new(Publisher::connect(&config.proxy_frontend).await?);
        let backend = BackendSocket::connect(&config.broker_backend).await?;
        let registry = Arc::new(RequestClient::connect(&config.registry).await?);

        let coordination = Arc::new(Coordination::new(
            core.clone(),
            publisher.clone(),
            registry,
            config.request_timeout,
        ));

        let rank = coordination.register().await?;
        let peers = coordination.fetch_list().await?;
        info!(
            server = %core.name,
            rank,
            known_servers = peers.len(),
            "registered with registry"
        );

        let subscriber = Subscriber::connect(&config.proxy_backend).await?;
        subscriber.subscribe(topics::REPLICA).await?;
        subscriber.subscribe(topics::SERVERS).await?;

        tokio::spawn(run_replica_listener(
            core.clone(),
            coordination.clone(),
            subscriber,
        ));
        tokio::spawn(run_heartbeat(
            coordination.clone(),
            config.heartbeat_interval,
        ));

        info!(server = %core.name, "serving requests");

        let mut handled: u64 = 0;
        loop {
            let (token, request) = match backend.recv_request().await {
                Ok(pair) => pair,
                Err(e) => {
                    // Undecodable frames are dropped; the loop keeps serving.
                    warn!(error = %e, "dropping undecodable request");
                    continue;
                }
            };

            core.clock.observe(request.data.clock);

            let reply = if request.service == "election" {
                handle_election(&core, &coordination).await
            } else {
                handlers::dispatch(&core, publisher.as_ref(), &request).await
            };

            if let Err(e) = backend.send_reply(token, reply).await {
                warn!(error = %e, "failed to send reply");
            }

            handled += 1;
            if config.sync_every > 0 && handled % config.sync_every == 0 {
                if let Err(e) = coordination.sync_and_elect().await {
                    warn!(error = %e, "registry sync failed, keeping stale view");
                }
            }
        }
    }
}

/// Client-triggered re-election: same path as the periodic sync, then
/// an acknowledging reply.
async fn handle_election(core: &ServerCore, coordination: &Coordination) -> Envelope {
    if let Err(e) = coordination.sync_and_elect().await {
        warn!(error = %e, "election sync failed, keeping stale view");
    }
    Envelope::new(
        "election",
        Payload {
            election: Some("OK".into()),
            coordinator: coordination.coordinator().await,
            ..Payload::stamped(core.clock.tick())
        },
    )
}
