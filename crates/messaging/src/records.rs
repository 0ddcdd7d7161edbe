use serde::{Deserialize, Serialize};

/// A channel broadcast, as carried on the pub/sub fabric and appended
/// to `publications.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
    /// Name of the server that produced the record. Never rewritten by
    /// replicators.
    pub origin: String,
    pub channel: String,
    pub user: String,
    pub message: String,
    pub timestamp: String,
    pub clock: u64,
}

/// A direct message, as carried on the pub/sub fabric and appended to
/// `messages.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub origin: String,
    pub src: String,
    pub dst: String,
    pub message: String,
    pub timestamp: String,
    pub clock: u64,
}

/// A write-log record: either a channel broadcast or a direct message.
///
/// Tagged with `type` so peers on the `replica` topic can dispatch to
/// the right log file. MessagePack on the wire, JSON in the log files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Record {
    Publish(PublishRecord),
    Message(MessageRecord),
}

impl Record {
    /// The server that produced this record.
    pub fn origin(&self) -> &str {
        match self {
            Self::Publish(r) => &r.origin,
            Self::Message(r) => &r.origin,
        }
    }

    /// The Lamport clock stamped at production time.
    pub fn clock(&self) -> u64 {
        match self {
            Self::Publish(r) => r.clock,
            Self::Message(r) => r.clock,
        }
    }

    /// The pub/sub topic this record is delivered on: the channel name
    /// for broadcasts, the recipient's username for direct messages.
    pub fn topic(&self) -> &str {
        match self {
            Self::Publish(r) => &r.channel,
            Self::Message(r) => &r.dst,
        }
    }

    /// Serialize to MessagePack bytes (wire form).
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    /// Deserialize from MessagePack bytes (wire form).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Election result published on the reserved `servers` topic whenever a
/// server's cached coordinator changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionAnnouncement {
    pub coordinator: String,
    pub timestamp: String,
    pub clock: u64,
}

impl ElectionAnnouncement {
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// A server as known by the registry: its election rank and the physical
/// timestamp of its last heartbeat (seconds since the Unix epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub rank: u32,
    pub last_beat: f64,
}
