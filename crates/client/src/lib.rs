//! Client side of the tagarela wire contract.
//!
//! Only the protocol lives here — menus, prompts, and traffic
//! generators are external concerns. A client speaks request/reply to
//! the broker and subscribes to the proxy: its own username for direct
//! messages, channel names for broadcasts.
//!
//! The client carries its own Lamport clock, stamped on every request
//! and merged from every reply and delivery, so causality reaches the
//! edge of the system.

use std::time::Duration;

use tagarela_messaging::{
    Envelope, FrameSubscriber, LamportClock, MessagingError, Payload, Record, RequestClient,
    RequestSender, Subscriber, Transport,
};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced to client applications.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),
}

/// A delivery received from the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The topic the frame arrived on (channel name or username).
    pub topic: String,
    pub record: Record,
}

pub struct ChatClient {
    username: String,
    clock: LamportClock,
    requests: RequestClient,
    subscriber: Subscriber,
    timeout: Duration,
}

impl ChatClient {
    /// Connect to the broker frontend and the proxy's subscriber side.
    pub async fn connect(
        broker: &Transport,
        proxy: &Transport,
        username: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            username: username.into(),
            clock: LamportClock::new(),
            requests: RequestClient::connect(broker).await?,
            subscriber: Subscriber::connect(proxy).await?,
            timeout: Duration::from_secs(5),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Override the request timeout (default 5s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The login handshake: register, fetch the channel list, subscribe
    /// to our own username for direct messages. Returns the channels on
    /// offer; call [`follow`](Self::follow) for the ones to join.
    pub async fn login(&self) -> Result<Vec<String>, ClientError> {
        self.request(
            "register_user",
            Payload {
                user: Some(self.username.clone()),
                ..Payload::default()
            },
        )
        .await?;

        let reply = self.request("list_channels", Payload::default()).await?;
        self.subscriber.subscribe(&self.username).await?;

        Ok(reply.channels.unwrap_or_default())
    }

    /// Subscribe to a channel's broadcasts.
    pub async fn follow(&self, channel: &str) -> Result<(), ClientError> {
        self.subscriber.subscribe(channel).await?;
        Ok(())
    }

    /// Broadcast to a channel. The reply payload carries `status` and,
    /// on rejection, the server's message.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<Payload, ClientError> {
        self.request(
            "publish",
            Payload {
                user: Some(self.username.clone()),
                channel: Some(channel.into()),
                message: Some(message.into()),
                ..Payload::default()
            },
        )
        .await
    }

    /// Direct message to another user.
    pub async fn message(&self, dst: &str, message: &str) -> Result<Payload, ClientError> {
        self.request(
            "message",
            Payload {
                src: Some(self.username.clone()),
                dst: Some(dst.into()),
                message: Some(message.into()),
                ..Payload::default()
            },
        )
        .await
    }

    /// Create a channel.
    pub async fn create_channel(&self, channel: &str) -> Result<Payload, ClientError> {
        self.request(
            "channel",
            Payload {
                channel: Some(channel.into()),
                ..Payload::default()
            },
        )
        .await
    }

    /// The known users.
    pub async fn users(&self) -> Result<Vec<String>, ClientError> {
        let reply = self.request("users", Payload::default()).await?;
        Ok(reply.users.unwrap_or_default())
    }

    /// The known channels.
    pub async fn channels(&self) -> Result<Vec<String>, ClientError> {
        let reply = self.request("channels", Payload::default()).await?;
        Ok(reply.channels.unwrap_or_default())
    }

    /// Ask a server for its time and logical clock.
    pub async fn server_clock(&self) -> Result<Payload, ClientError> {
        self.request("clock", Payload::default()).await
    }

    /// Trigger a re-election on whichever server answers.
    pub async fn election(&self) -> Result<Payload, ClientError> {
        self.request("election", Payload::default()).await
    }

    /// Send one stamped request and merge the reply's clock.
    pub async fn request(
        &self,
        service: &str,
        mut data: Payload,
    ) -> Result<Payload, ClientError> {
        data.timestamp = Some(tagarela_messaging::now_iso());
        data.clock = self.clock.tick();

        let reply = self
            .requests
            .request(Envelope::new(service, data), self.timeout)
            .await?;

        self.clock.observe(reply.data.clock);
        debug!(service = %reply.service, clock = reply.data.clock, "reply received");
        Ok(reply.data)
    }

    /// Wait for the next decodable delivery on any subscribed topic.
    /// Undecodable frames are dropped silently.
    pub async fn next_delivery(&self) -> Result<Delivery, ClientError> {
        loop {
            let (topic, payload) = self.subscriber.recv().await?;
            match Record::from_bytes(&payload) {
                Ok(record) => {
                    self.clock.observe(record.clock());
                    return Ok(Delivery { topic, record });
                }
                Err(e) => {
                    debug!(topic = %topic, error = %e, "dropping undecodable frame");
                }
            }
        }
    }

    /// The client's current logical clock value.
    pub fn clock(&self) -> u64 {
        self.clock.current()
    }
}
