//! The replica listener: the second concurrent loop inside a server.
//!
//! Subscribes to the reserved topics and ingests peer traffic:
//! - `replica` frames are peer write-log records; self-originated ones
//!   are dropped before any side effect, the rest are appended to the
//!   matching local log. Nothing is replied and nothing re-emitted,
//!   which is what keeps the server↔proxy↔server cycle from looping.
//! - `servers` frames are election announcements, adopted advisorily.
//!
//! Undecodable frames are dropped silently; the loop never stops for
//! bad input.

use std::sync::Arc;

use tagarela_messaging::{topics, ElectionAnnouncement, FrameSubscriber, Record};
use tracing::{debug, error, info, warn};

use crate::coordination::Coordination;
use crate::state::ServerCore;

pub async fn run_replica_listener<S: FrameSubscriber>(
    core: Arc<ServerCore>,
    coordination: Arc<Coordination>,
    subscriber: S,
) {
    loop {
        let (topic, payload) = match subscriber.recv().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "replica subscriber recv error");
                continue;
            }
        };

        match topic.as_str() {
            topics::REPLICA => ingest_record(&core, &payload).await,
            topics::SERVERS => ingest_announcement(&core, &coordination, &payload).await,
            other => debug!(topic = %other, "ignoring unexpected topic"),
        }
    }
}

/// Apply one `replica` frame to the local logs.
async fn ingest_record(core: &ServerCore, payload: &[u8]) {
    let record = match Record::from_bytes(payload) {
        Ok(record) => record,
        Err(e) => {
            debug!(error = %e, "dropping undecodable replica frame");
            return;
        }
    };

    // Our own echo coming back around the proxy: drop before any side
    // effect, or every write would loop forever.
    if record.origin() == core.name {
        return;
    }

    core.clock.observe(record.clock());

    let log = match &record {
        Record::Publish(_) => &core.publications,
        Record::Message(_) => &core.messages,
    };

    if let Err(e) = log.append(&record).await {
        error!(
            origin = %record.origin(),
            path = %log.path().display(),
            error = %e,
            "failed to append replicated record"
        );
    } else {
        debug!(origin = %record.origin(), clock = record.clock(), "replicated record");
    }
}

/// Apply one `servers` frame: adopt the announced coordinator.
async fn ingest_announcement(core: &ServerCore, coordination: &Coordination, payload: &[u8]) {
    let announcement = match ElectionAnnouncement::from_bytes(payload) {
        Ok(announcement) => announcement,
        Err(e) => {
            debug!(error = %e, "dropping undecodable election announcement");
            return;
        }
    };

    core.clock.observe(announcement.clock);
    info!(coordinator = %announcement.coordinator, "election announcement received");
    coordination.adopt(&announcement.coordinator).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::CapturePublisher;
    use crate::logs::read_records;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tagarela_messaging::{
        Envelope, MessagingError, Payload, PublishRecord, RequestSender,
    };
    use tokio::sync::Mutex;

    /// Subscriber that replays scripted frames, then parks forever.
    struct ScriptedSubscriber {
        frames: Mutex<VecDeque<(String, Vec<u8>)>>,
    }

    impl ScriptedSubscriber {
        fn new(frames: Vec<(String, Vec<u8>)>) -> Self {
            Self {
                frames: Mutex::new(frames.into()),
            }
        }
    }

    #[async_trait]
    impl FrameSubscriber for ScriptedSubscriber {
        async fn subscribe(&self, _prefix: &str) -> Result<(), MessagingError> {
            Ok(())
        }

        async fn recv(&self) -> Result<(String, Vec<u8>), MessagingError> {
            if let Some(frame) = self.frames.lock().await.pop_front() {
                return Ok(frame);
            }
            // Script exhausted: behave like a quiet socket.
            std::future::pending().await
        }
    }

    struct NullRegistry;

    #[async_trait]
    impl RequestSender for NullRegistry {
        async fn request(
            &self,
            env: Envelope,
            _timeout: Duration,
        ) -> Result<Envelope, MessagingError> {
            Ok(Envelope::new(env.service, Payload::stamped(0)))
        }
    }

    fn record_from(origin: &str, clock: u64) -> Record {
        Record::Publish(PublishRecord {
            origin: origin.into(),
            channel: "general".into(),
            user: "alice".into(),
            message: "hi".into(),
            timestamp: "2026-08-01T12:00:00.000000Z".into(),
            clock,
        })
    }

    async fn run_script(
        name: &str,
        frames: Vec<(String, Vec<u8>)>,
    ) -> (tempfile::TempDir, Arc<ServerCore>, Arc<Coordination>) {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(ServerCore::open(name, dir.path()).unwrap());
        let coordination = Arc::new(Coordination::new(
            core.clone(),
            Arc::new(CapturePublisher::default()),
            Arc::new(NullRegistry),
            Duration::from_secs(1),
        ));

        let listener = tokio::spawn(run_replica_listener(
            core.clone(),
            coordination.clone(),
            ScriptedSubscriber::new(frames),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        listener.abort();

        (dir, core, coordination)
    }

    #[tokio::test]
    async fn peer_records_are_appended() {
        let record = record_from("srv1", 40);
        let (_dir, core, _) = run_script(
            "srv2",
            vec![("replica".into(), record.to_bytes().unwrap())],
        )
        .await;

        let replicated = read_records(core.publications.path()).unwrap();
        assert_eq!(replicated, vec![record]);
        // The peer's clock was merged.
        assert!(core.clock.current() > 40);
    }

    #[tokio::test]
    async fn own_echo_is_dropped() {
        let record = record_from("srv1", 40);
        let (_dir, core, _) = run_script(
            "srv1",
            vec![("replica".into(), record.to_bytes().unwrap())],
        )
        .await;

        assert!(read_records(core.publications.path()).unwrap().is_empty());
        // Dropped before any side effect, clock included.
        assert_eq!(core.clock.current(), 0);
    }

    #[tokio::test]
    async fn garbage_frames_are_skipped() {
        let good = record_from("srv1", 7);
        let (_dir, core, _) = run_script(
            "srv2",
            vec![
                ("replica".into(), b"not msgpack".to_vec()),
                ("replica".into(), good.to_bytes().unwrap()),
            ],
        )
        .await;

        assert_eq!(read_records(core.publications.path()).unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn announcements_are_adopted() {
        let announcement = ElectionAnnouncement {
            coordinator: "srv1".into(),
            timestamp: "2026-08-01T12:00:00.000000Z".into(),
            clock: 12,
        };
        let (_dir, core, coordination) = run_script(
            "srv3",
            vec![("servers".into(), announcement.to_bytes().unwrap())],
        )
        .await;

        assert_eq!(coordination.coordinator().await, Some("srv1".into()));
        assert!(core.clock.current() > 12);
    }
}
