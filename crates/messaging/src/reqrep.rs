//! Request/reply plumbing over ZeroMQ DEALER/ROUTER sockets.
//!
//! Three participants share the framing rules:
//! - [`RequestClient`] — DEALER used by clients (via the broker) and by
//!   servers talking straight to the registry
//! - [`RequestServer`] — ROUTER bound by the registry
//! - [`BackendSocket`] — DEALER a server connects to the broker's
//!   backend; requests arrive with the originating client's identity
//!   already prepended by the broker's ROUTER
//!
//! ## Framing (zeromq-rs 0.4)
//!
//! - client DEALER sends: `[envelope]`
//! - broker ROUTER receives: `[identity, envelope]` and forwards verbatim
//! - server DEALER receives: `[identity, envelope]`
//! - server DEALER replies: `[identity, envelope]`
//! - broker ROUTER pops `identity` and routes the reply home
//!
//! Empty delimiter frames (inserted by REQ-style peers) are tolerated
//! and skipped on the way in.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

use crate::envelope::Envelope;
use crate::error::MessagingError;
use crate::traits::{CommandHandler, RequestSender};
use crate::transport::Transport;

/// Opaque token carrying the routing identity of a request.
///
/// Whoever receives a request must pass the token back to `send_reply`
/// so the reply travels to the correct peer.
#[derive(Debug, Clone)]
pub struct ReplyToken {
    identity: Vec<u8>,
}

impl ReplyToken {
    #[cfg(test)]
    pub(crate) fn for_tests(identity: Vec<u8>) -> Self {
        Self { identity }
    }
}

/// Split an inbound ZMQ message into `(identity, envelope)`.
///
/// The first frame is the peer identity; any empty delimiter frames
/// after it are skipped; the first remaining frame is the envelope.
fn split_request(zmq_msg: &ZmqMessage) -> Result<(Vec<u8>, Envelope), MessagingError> {
    let frames: Vec<_> = zmq_msg.iter().collect();
    if frames.len() < 2 {
        return Err(MessagingError::Transport(format!(
            "expected [identity, envelope] frames, got {}",
            frames.len()
        )));
    }

    let identity = frames[0].as_ref().to_vec();
    let payload = frames[1..]
        .iter()
        .find(|f| !f.as_ref().is_empty())
        .ok_or_else(|| {
            MessagingError::Transport("no payload frame after identity".into())
        })?;

    let envelope = Envelope::from_bytes(payload.as_ref())?;
    Ok((identity, envelope))
}

/// Build the outbound `[identity, envelope]` reply message.
fn build_reply(identity: Vec<u8>, reply: &Envelope) -> Result<ZmqMessage, MessagingError> {
    let bytes = reply.to_bytes()?;
    let mut zmq_msg = ZmqMessage::from(identity);
    zmq_msg.push_back(bytes.into());
    Ok(zmq_msg)
}

/// DEALER-socket client for strict request/reply exchanges.
///
/// The wire contract carries no correlation ids, so the socket is held
/// for the whole send+receive exchange; concurrent callers queue on the
/// internal mutex. A timeout bounds the wait so a lost reply surfaces
/// as [`MessagingError::Timeout`] instead of deadlocking the caller.
pub struct RequestClient {
    socket: Mutex<DealerSocket>,
}

impl RequestClient {
    /// Connect a DEALER socket to the broker front (or a ROUTER directly).
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, MessagingError> {
        let mut socket = DealerSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting DEALER socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl RequestSender for RequestClient {
    async fn request(
        &self,
        env: Envelope,
        timeout: Duration,
    ) -> Result<Envelope, MessagingError> {
        let bytes = env.to_bytes()?;
        let zmq_msg: ZmqMessage = bytes.into();

        // Hold the socket across send+recv so exchanges never interleave.
        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;
        debug!(service = %env.service, "sent request");

        let reply_msg = tokio::time::timeout(timeout, socket.recv())
            .await
            .map_err(|_| MessagingError::Timeout(timeout))??;

        let payload = reply_msg
            .iter()
            .find(|f| !f.as_ref().is_empty())
            .ok_or_else(|| MessagingError::Transport("empty reply message".into()))?;

        let reply = Envelope::from_bytes(payload.as_ref())?;
        debug!(service = %reply.service, "received reply");
        Ok(reply)
    }
}

/// ROUTER-socket server, bound by the registry.
///
/// Each received request carries the peer identity, wrapped in a
/// [`ReplyToken`] for routing the reply back.
pub struct RequestServer {
    socket: Mutex<RouterSocket>,
}

impl RequestServer {
    /// Bind a ROUTER socket on the given transport endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, MessagingError> {
        let mut socket = RouterSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding ROUTER socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl CommandHandler for RequestServer {
    async fn recv_request(&self) -> Result<(ReplyToken, Envelope), MessagingError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;
        let (identity, envelope) = split_request(&zmq_msg)?;
        debug!(service = %envelope.service, "received request");
        Ok((ReplyToken { identity }, envelope))
    }

    async fn send_reply(&self, token: ReplyToken, reply: Envelope) -> Result<(), MessagingError> {
        let zmq_msg = build_reply(token.identity, &reply)?;
        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;
        debug!(service = %reply.service, "sent reply");
        Ok(())
    }
}

/// DEALER socket a server connects to the broker's backend.
///
/// The broker's frontend ROUTER prepends each client's identity before
/// forwarding, so requests arrive here as `[identity, envelope]` and
/// replies must echo the identity frame for the return trip.
pub struct BackendSocket {
    socket: Mutex<DealerSocket>,
}

impl BackendSocket {
    /// Connect to the broker's backend endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, MessagingError> {
        let mut socket = DealerSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting backend DEALER socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl CommandHandler for BackendSocket {
    async fn recv_request(&self) -> Result<(ReplyToken, Envelope), MessagingError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;
        let (identity, envelope) = split_request(&zmq_msg)?;
        debug!(service = %envelope.service, "received request via broker");
        Ok((ReplyToken { identity }, envelope))
    }

    async fn send_reply(&self, token: ReplyToken, reply: Envelope) -> Result<(), MessagingError> {
        let zmq_msg = build_reply(token.identity, &reply)?;
        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;
        debug!(service = %reply.service, "sent reply via broker");
        Ok(())
    }
}
