//! Reserved topic names on the pub/sub fabric.
//!
//! User channels share the topic namespace with these, so the server
//! rejects them at channel-creation time.

/// Inter-server replication: every server echoes its own writes here.
pub const REPLICA: &str = "replica";

/// Election announcements.
pub const SERVERS: &str = "servers";

/// All topics that may never be claimed as channel names.
pub const RESERVED: &[&str] = &[REPLICA, SERVERS];

/// Whether `name` collides with a reserved topic.
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}
