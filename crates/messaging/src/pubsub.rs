use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::MessagingError;
use crate::traits::{FramePublisher, FrameSubscriber};
use crate::transport::Transport;

/// ZeroMQ PUB socket that connects to the proxy's publisher side.
///
/// Frames are sent as two-part ZMQ messages:
/// 1. Topic string (used by SUB sockets for prefix filtering)
/// 2. MessagePack-encoded payload
pub struct Publisher {
    socket: Mutex<PubSocket>,
}

impl Publisher {
    /// Connect to the proxy's publisher-facing endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, MessagingError> {
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting PUB socket to proxy");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Bind the PUB socket directly (no proxy in between).
    ///
    /// Used by tests and single-host deployments where subscribers
    /// connect straight to the publisher.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, MessagingError> {
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding PUB socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl FramePublisher for Publisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        let mut zmq_msg = ZmqMessage::from(topic);
        zmq_msg.push_back(payload.into());

        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;

        debug!(topic = %topic, "published frame");
        Ok(())
    }
}

/// ZeroMQ SUB socket that connects to the proxy's subscriber side.
///
/// Receives two-part `[topic, payload]` frames matching the subscribed
/// prefixes.
pub struct Subscriber {
    socket: Mutex<SubSocket>,
}

impl Subscriber {
    /// Connect to the proxy's subscriber-facing endpoint (or directly
    /// to a bound publisher).
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, MessagingError> {
        let mut socket = SubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting SUB socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl FrameSubscriber for Subscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), MessagingError> {
        let mut socket = self.socket.lock().await;
        socket.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed to topic prefix");
        Ok(())
    }

    async fn recv(&self) -> Result<(String, Vec<u8>), MessagingError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;

        let frames: Vec<_> = zmq_msg.iter().collect();
        if frames.len() < 2 {
            return Err(MessagingError::Transport(format!(
                "expected [topic, payload] frames, got {}",
                frames.len()
            )));
        }

        let topic = String::from_utf8_lossy(frames[0].as_ref()).into_owned();
        let payload = frames[1].as_ref().to_vec();
        debug!(topic = %topic, bytes = payload.len(), "received frame");
        Ok((topic, payload))
    }
}
