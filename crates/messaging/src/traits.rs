use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::MessagingError;
use crate::reqrep::ReplyToken;

/// Publishes topic-framed payloads to the fabric.
///
/// Publishers send `[topic, payload]` frames; subscribers filter by
/// topic prefix. This is the broadcast side of the fan-out pattern.
#[async_trait]
pub trait FramePublisher: Send + Sync {
    /// Publish a payload under the given topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MessagingError>;
}

/// Blanket implementation so `Arc<dyn FramePublisher>` can be used directly.
#[async_trait]
impl<T: FramePublisher + ?Sized> FramePublisher for Arc<T> {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        (**self).publish(topic, payload).await
    }
}

/// Receives topic-framed payloads matching subscribed prefixes.
#[async_trait]
pub trait FrameSubscriber: Send + Sync {
    /// Subscribe to topics starting with the given prefix.
    /// The empty string subscribes to everything.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), MessagingError>;

    /// Receive the next `(topic, payload)` frame. Blocks until one arrives.
    async fn recv(&self) -> Result<(String, Vec<u8>), MessagingError>;
}

/// Server side of the request/reply contract: receive an envelope with
/// a routing token, send the reply back through the same token.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn recv_request(&self) -> Result<(ReplyToken, Envelope), MessagingError>;

    async fn send_reply(&self, token: ReplyToken, reply: Envelope) -> Result<(), MessagingError>;
}

/// Client side of the request/reply contract.
#[async_trait]
pub trait RequestSender: Send + Sync {
    /// Send a request and wait for the reply, up to `timeout`.
    async fn request(&self, env: Envelope, timeout: Duration) -> Result<Envelope, MessagingError>;
}
