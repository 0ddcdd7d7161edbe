use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::MessagingError;
use crate::transport::Transport;

/// Counters collected by the proxy while forwarding.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    /// Total frames forwarded.
    pub total_frames: AtomicU64,
    /// Per-topic frame counts.
    pub topic_counts: Mutex<HashMap<String, u64>>,
}

impl ProxyMetrics {
    pub fn total(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }
}

/// Configuration for the topic proxy.
#[derive(Debug, Clone)]
pub struct TopicProxyConfig {
    /// Endpoint where publishers (servers) connect.
    pub frontend: Transport,
    /// Endpoint where subscribers (clients and servers) connect.
    pub backend: Transport,
}

impl TopicProxyConfig {
    /// TCP configuration on the given host.
    pub fn tcp(host: &str, frontend_port: u16, backend_port: u16) -> Self {
        Self {
            frontend: Transport::tcp(host, frontend_port),
            backend: Transport::tcp(host, backend_port),
        }
    }
}

impl Default for TopicProxyConfig {
    fn default() -> Self {
        Self::tcp("0.0.0.0", 5557, 5558)
    }
}

/// Topic-filtered publish/subscribe switch.
///
/// - Publishers connect to the **frontend** (SUB socket the proxy binds).
/// - Subscribers connect to the **backend** (PUB socket the proxy binds).
/// - `[topic, payload]` frames received on the frontend are forwarded to
///   the backend, where subscriber-side prefix matching applies.
///
/// zeromq 0.4 provides no XSUB/XPUB socket types, so the proxy pattern
/// is emulated with SUB+PUB: the frontend subscribes to all topics and
/// every frame crosses the proxy regardless of downstream subscriptions.
/// Subscription upstreaming (last-value caching) is therefore not
/// available, which this system does not need.
pub struct TopicProxy {
    config: TopicProxyConfig,
    metrics: Arc<ProxyMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl TopicProxy {
    pub fn new(config: TopicProxyConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(ProxyMetrics::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn metrics(&self) -> &Arc<ProxyMetrics> {
        &self.metrics
    }

    /// Signal the proxy to shut down gracefully.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run the forwarding loop. Returns when shutdown is signaled or an
    /// unrecoverable socket error occurs.
    pub async fn run(&self) -> Result<(), MessagingError> {
        let mut frontend = SubSocket::new();
        frontend.bind(&self.config.frontend.endpoint()).await?;
        // Subscribe to everything so every frame is forwarded.
        frontend.subscribe("").await?;
        tracing::info!(
            endpoint = %self.config.frontend.endpoint(),
            "proxy frontend (SUB) bound — publishers connect here"
        );

        let mut backend = PubSocket::new();
        backend.bind(&self.config.backend.endpoint()).await?;
        tracing::info!(
            endpoint = %self.config.backend.endpoint(),
            "proxy backend (PUB) bound — subscribers connect here"
        );

        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.clone();

        tracing::info!("proxy forwarding loop started");

        loop {
            if shutdown.load(Ordering::SeqCst) {
                tracing::info!("proxy shutting down");
                break;
            }

            // Use a timeout so we periodically check the shutdown flag.
            let recv_result =
                tokio::time::timeout(std::time::Duration::from_millis(100), frontend.recv())
                    .await;

            let msg = match recv_result {
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "frontend recv error");
                    continue;
                }
                Err(_) => continue,
            };

            let topic = extract_topic(&msg);

            metrics.total_frames.fetch_add(1, Ordering::Relaxed);
            {
                let mut counts = metrics.topic_counts.lock().await;
                *counts.entry(topic.clone()).or_insert(0) += 1;
            }

            tracing::debug!(
                topic = %topic,
                total = metrics.total(),
                "forwarding frame"
            );

            if let Err(e) = backend.send(msg).await {
                tracing::warn!(error = %e, "backend send error");
            }
        }

        tracing::info!(total = metrics.total(), "proxy stopped");
        Ok(())
    }
}

/// Extract the topic string from the first frame of a ZMQ message.
fn extract_topic(msg: &ZmqMessage) -> String {
    msg.iter()
        .next()
        .map(|frame| String::from_utf8_lossy(frame.as_ref()).into_owned())
        .unwrap_or_else(|| "<empty>".to_string())
}
