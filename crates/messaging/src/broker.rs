use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket};

use crate::error::MessagingError;
use crate::transport::Transport;

/// Counters collected by the request broker while routing.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    /// Requests forwarded frontend → backend.
    pub requests: AtomicU64,
    /// Replies forwarded backend → frontend.
    pub replies: AtomicU64,
}

impl BrokerMetrics {
    pub fn requests_total(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn replies_total(&self) -> u64 {
        self.replies.load(Ordering::Relaxed)
    }
}

/// Configuration for the request broker.
#[derive(Debug, Clone)]
pub struct RequestBrokerConfig {
    /// Frontend endpoint where clients connect (broker binds ROUTER here).
    pub frontend: Transport,
    /// Backend endpoint where servers connect (broker binds DEALER here).
    pub backend: Transport,
}

impl RequestBrokerConfig {
    /// TCP configuration on the given host.
    pub fn tcp(host: &str, frontend_port: u16, backend_port: u16) -> Self {
        Self {
            frontend: Transport::tcp(host, frontend_port),
            backend: Transport::tcp(host, backend_port),
        }
    }
}

impl Default for RequestBrokerConfig {
    fn default() -> Self {
        Self::tcp("0.0.0.0", 5555, 5556)
    }
}

/// Identity-preserving request/reply router between clients and servers.
///
/// - Clients connect DEALER sockets to the **frontend** (ROUTER).
/// - Servers connect DEALER sockets to the **backend** (DEALER).
///
/// Inbound requests arrive as `[identity, envelope]` (the ROUTER
/// prepends the client identity) and are forwarded verbatim to one
/// server, round-robin. Replies come back as `[identity, envelope]`;
/// the ROUTER pops the identity and routes the reply to the right
/// client. Payloads are never interpreted and no retries are made: a
/// server crashing mid-request drops that request on the floor.
pub struct RequestBroker {
    config: RequestBrokerConfig,
    metrics: Arc<BrokerMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl RequestBroker {
    pub fn new(config: RequestBrokerConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(BrokerMetrics::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    /// Signal the broker to shut down gracefully.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run the routing loop. Returns when shutdown is signaled or an
    /// unrecoverable socket error occurs.
    pub async fn run(&self) -> Result<(), MessagingError> {
        let mut frontend = RouterSocket::new();
        frontend.bind(&self.config.frontend.endpoint()).await?;
        tracing::info!(
            endpoint = %self.config.frontend.endpoint(),
            "broker frontend (ROUTER) bound — clients connect here"
        );

        let mut backend = DealerSocket::new();
        backend.bind(&self.config.backend.endpoint()).await?;
        tracing::info!(
            endpoint = %self.config.backend.endpoint(),
            "broker backend (DEALER) bound — servers connect here"
        );

        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.clone();

        tracing::info!("broker routing loop started");

        loop {
            if shutdown.load(Ordering::SeqCst) {
                tracing::info!("broker shutting down");
                break;
            }

            tokio::select! {
                // Client request: forward verbatim, identity frame included.
                inbound = frontend.recv() => {
                    let msg = match inbound {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::warn!(error = %e, "frontend recv error");
                            continue;
                        }
                    };
                    metrics.requests.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = backend.send(msg).await {
                        tracing::warn!(error = %e, "backend send error, request dropped");
                    }
                }
                // Server reply: first frame is the client identity the
                // ROUTER uses to route it home.
                outbound = backend.recv() => {
                    let msg = match outbound {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::warn!(error = %e, "backend recv error");
                            continue;
                        }
                    };
                    metrics.replies.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = frontend.send(msg).await {
                        tracing::warn!(error = %e, "frontend send error, reply dropped");
                    }
                }
                // Wake up periodically to check the shutdown flag.
                _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
            }
        }

        tracing::info!(
            requests = metrics.requests_total(),
            replies = metrics.replies_total(),
            "broker stopped"
        );

        Ok(())
    }
}
