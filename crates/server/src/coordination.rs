//! Registry interactions and coordinator election.
//!
//! One instance per server, shared by the request loop (startup
//! registration, periodic sync, the `election` command), the heartbeat
//! task, and the replica listener (announcement adoption). The registry
//! socket is strict request/reply, so every exchange goes through the
//! one [`RequestSender`] and its internal lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tagarela_messaging::{
    now_iso, topics, ElectionAnnouncement, Envelope, FramePublisher, Payload, RequestSender,
    ServerIdentity,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::state::ServerCore;
use crate::ServerError;

pub struct Coordination {
    core: Arc<ServerCore>,
    publisher: Arc<dyn FramePublisher>,
    registry: Arc<dyn RequestSender>,
    coordinator: Mutex<Option<String>>,
    timeout: Duration,
}

impl Coordination {
    pub fn new(
        core: Arc<ServerCore>,
        publisher: Arc<dyn FramePublisher>,
        registry: Arc<dyn RequestSender>,
        timeout: Duration,
    ) -> Self {
        Self {
            core,
            publisher,
            registry,
            coordinator: Mutex::new(None),
            timeout,
        }
    }

    /// The currently cached coordinator, if any election has run.
    pub async fn coordinator(&self) -> Option<String> {
        self.coordinator.lock().await.clone()
    }

    /// Ask the registry for this server's rank, registering it on first
    /// sight. Must succeed before the server starts serving.
    pub async fn register(&self) -> Result<u32, ServerError> {
        let reply = self.exchange("rank", true).await?;
        reply.data.rank.ok_or_else(|| ServerError::RegistryRefusal {
            service: "rank".into(),
            message: reply
                .data
                .message
                .unwrap_or_else(|| "resposta sem rank".into()),
        })
    }

    /// Fetch the full server map.
    pub async fn fetch_list(
        &self,
    ) -> Result<BTreeMap<String, ServerIdentity>, ServerError> {
        let reply = self.exchange("list", false).await?;
        Ok(reply.data.list.unwrap_or_default())
    }

    /// Report liveness. Failures are the caller's to log; the server
    /// keeps serving with its stale view either way.
    pub async fn heartbeat(&self) -> Result<(), ServerError> {
        self.exchange("heartbeat", true).await?;
        Ok(())
    }

    /// Berkeley-style sync hook, simplified: sample the registry's
    /// physical clock and merge only the Lamport clock of the reply.
    /// No physical clock is adjusted.
    pub async fn probe_clock(&self) -> Result<(), ServerError> {
        let reply = self.exchange("clock", false).await?;
        debug!(
            registry_time = reply.data.time.as_deref().unwrap_or("?"),
            "registry clock sampled"
        );
        Ok(())
    }

    /// The periodic sync: clock probe, fresh `list`, re-election.
    pub async fn sync_and_elect(&self) -> Result<(), ServerError> {
        self.probe_clock().await?;
        let servers = self.fetch_list().await?;
        self.elect(&servers).await;
        Ok(())
    }

    /// Re-run the election against a server map.
    ///
    /// The coordinator is the lowest-ranked server in the map as this
    /// server currently sees it — no liveness probe. A change updates
    /// the cache; an announcement goes out only for a coordinator other
    /// than ourselves (a server never proclaims its own leadership, it
    /// only points peers at someone else's).
    pub async fn elect(&self, servers: &BTreeMap<String, ServerIdentity>) {
        let Some(new) = lowest_rank(servers) else {
            return;
        };

        {
            let mut cached = self.coordinator.lock().await;
            if cached.as_deref() == Some(new.as_str()) {
                return;
            }
            info!(coordinator = %new, "coordinator changed");
            *cached = Some(new.clone());
        }

        if new == self.core.name {
            return;
        }

        let announcement = ElectionAnnouncement {
            coordinator: new,
            timestamp: now_iso(),
            clock: self.core.clock.tick(),
        };
        match announcement.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.publisher.publish(topics::SERVERS, bytes).await {
                    warn!(error = %e, "failed to publish election announcement");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode election announcement"),
        }
    }

    /// Adopt a coordinator announced by a peer. Advisory: the next
    /// local election may overwrite it, and it is never re-published.
    pub async fn adopt(&self, coordinator: &str) {
        let mut cached = self.coordinator.lock().await;
        if cached.as_deref() != Some(coordinator) {
            info!(coordinator = %coordinator, "adopting announced coordinator");
            *cached = Some(coordinator.to_string());
        }
    }

    /// One stamped request/reply exchange with the registry, merging
    /// the reply's clock on the way back.
    async fn exchange(&self, service: &str, with_name: bool) -> Result<Envelope, ServerError> {
        let request = Envelope::new(
            service,
            Payload {
                user: with_name.then(|| self.core.name.clone()),
                ..Payload::stamped(self.core.clock.tick())
            },
        );
        let reply = self.registry.request(request, self.timeout).await?;
        self.core.clock.observe(reply.data.clock);
        Ok(reply)
    }
}

/// The election rule: minimum rank wins; names break ties so the result
/// is deterministic even against a corrupted map.
pub fn lowest_rank(servers: &BTreeMap<String, ServerIdentity>) -> Option<String> {
    servers
        .iter()
        .min_by_key(|(name, identity)| (identity.rank, name.as_str()))
        .map(|(name, _)| name.clone())
}

/// Periodic heartbeat loop. A hung or unreachable registry is logged
/// and retried next interval; client traffic is never blocked on it.
pub async fn run_heartbeat(coordination: Arc<Coordination>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; registration already happened.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = coordination.heartbeat().await {
            warn!(error = %e, "heartbeat failed, registry unreachable");
        }
    }
}
