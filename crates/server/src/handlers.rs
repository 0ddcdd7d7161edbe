//! Command dispatch for the client-facing services.
//!
//! The caller has already observed the request's clock; every reply
//! built here stamps a fresh `next_clock()` value. The `election`
//! service is handled by the server loop itself because it drives the
//! registry socket.

use tagarela_messaging::{
    now_iso, topics, Envelope, FramePublisher, MessageRecord, Payload, PublishRecord, Record,
};
use tracing::{error, warn};

use crate::state::ServerCore;

/// Route one request to its handler and build the reply envelope.
///
/// Unknown services get the canonical `erro` reply; the request still
/// counts as handled and still bumped the clock.
pub async fn dispatch<P: FramePublisher>(
    core: &ServerCore,
    publisher: &P,
    request: &Envelope,
) -> Envelope {
    match request.service.as_str() {
        // Two spellings for historic clients; same semantics.
        "login" | "register_user" => handle_login(core, request).await,
        "users" => handle_users(core, request).await,
        "channel" => handle_channel(core, request).await,
        "channels" | "list_channels" => handle_channels(core, request).await,
        "publish" => handle_publish(core, publisher, request).await,
        "message" => handle_message(core, publisher, request).await,
        "clock" => handle_clock(core, request),
        other => {
            warn!(service = %other, "unknown service");
            Envelope::new(
                other,
                Payload::erro("serviço desconhecido", core.clock.tick()),
            )
        }
    }
}

async fn handle_login(core: &ServerCore, request: &Envelope) -> Envelope {
    let service = request.service.as_str();
    let Some(user) = request.data.user.as_deref() else {
        return Envelope::new(
            service,
            Payload::erro("usuário não informado", core.clock.tick()),
        );
    };

    let mut registry = core.registry.lock().await;
    if let Err(e) = registry.insert_user(user) {
        error!(user = %user, error = %e, "failed to persist user");
    }

    Envelope::new(
        service,
        Payload {
            users: Some(registry.users()),
            ..Payload::ok(core.clock.tick())
        },
    )
}

async fn handle_users(core: &ServerCore, request: &Envelope) -> Envelope {
    let registry = core.registry.lock().await;
    Envelope::new(
        request.service.as_str(),
        Payload {
            users: Some(registry.users()),
            ..Payload::stamped(core.clock.tick())
        },
    )
}

async fn handle_channel(core: &ServerCore, request: &Envelope) -> Envelope {
    let Some(channel) = request.data.channel.as_deref() else {
        return Envelope::new(
            "channel",
            Payload::erro("canal não informado", core.clock.tick()),
        );
    };

    if topics::is_reserved(channel) {
        return Envelope::new(
            "channel",
            Payload::erro("nome de canal reservado", core.clock.tick()),
        );
    }

    let mut registry = core.registry.lock().await;
    if registry.has_channel(channel) {
        return Envelope::new(
            "channel",
            Payload::erro("Canal já existe", core.clock.tick()),
        );
    }

    if let Err(e) = registry.insert_channel(channel) {
        error!(channel = %channel, error = %e, "failed to persist channel");
    }

    Envelope::new(
        "channel",
        Payload {
            channels: Some(registry.channels()),
            ..Payload::ok(core.clock.tick())
        },
    )
}

async fn handle_channels(core: &ServerCore, request: &Envelope) -> Envelope {
    let registry = core.registry.lock().await;
    Envelope::new(
        request.service.as_str(),
        Payload {
            channels: Some(registry.channels()),
            ..Payload::stamped(core.clock.tick())
        },
    )
}

/// Channel broadcast. Emit sequence: validate, stamp, publish on the
/// channel topic, append to the log, echo on `replica`, reply OK. The
/// reply gets its own clock bump — the broadcast and the reply are
/// distinct causal events.
async fn handle_publish<P: FramePublisher>(
    core: &ServerCore,
    publisher: &P,
    request: &Envelope,
) -> Envelope {
    let data = &request.data;
    let Some(channel) = data.channel.as_deref() else {
        return Envelope::new(
            "publish",
            Payload::erro("canal não informado", core.clock.tick()),
        );
    };
    let Some(user) = data.user.as_deref() else {
        return Envelope::new(
            "publish",
            Payload::erro("usuário não informado", core.clock.tick()),
        );
    };
    let Some(message) = data.message.as_deref() else {
        return Envelope::new(
            "publish",
            Payload::erro("mensagem não informada", core.clock.tick()),
        );
    };

    {
        let registry = core.registry.lock().await;
        if !registry.has_channel(channel) {
            return Envelope::new(
                "publish",
                Payload::erro("canal inexistente", core.clock.tick()),
            );
        }
    }

    let record = Record::Publish(PublishRecord {
        origin: core.name.clone(),
        channel: channel.to_string(),
        user: user.to_string(),
        message: message.to_string(),
        timestamp: now_iso(),
        clock: core.clock.tick(),
    });

    emit(core, publisher, &record, &core.publications).await;

    Envelope::new("publish", Payload::ok(core.clock.tick()))
}

/// Direct message. Same emit sequence as `publish`, delivered on the
/// recipient's username topic and appended to the messages log.
async fn handle_message<P: FramePublisher>(
    core: &ServerCore,
    publisher: &P,
    request: &Envelope,
) -> Envelope {
    let data = &request.data;
    let Some(src) = data.src.as_deref() else {
        return Envelope::new(
            "message",
            Payload::erro("remetente não informado", core.clock.tick()),
        );
    };
    let Some(dst) = data.dst.as_deref() else {
        return Envelope::new(
            "message",
            Payload::erro("usuário não informado", core.clock.tick()),
        );
    };
    let Some(message) = data.message.as_deref() else {
        return Envelope::new(
            "message",
            Payload::erro("mensagem não informada", core.clock.tick()),
        );
    };

    {
        // Recipient check applies once anyone has logged in; an empty
        // user set means this server has no view of users yet.
        let registry = core.registry.lock().await;
        if !registry.users().is_empty() && !registry.has_user(dst) {
            return Envelope::new(
                "message",
                Payload::erro("usuário inexistente", core.clock.tick()),
            );
        }
    }

    let record = Record::Message(MessageRecord {
        origin: core.name.clone(),
        src: src.to_string(),
        dst: dst.to_string(),
        message: message.to_string(),
        timestamp: now_iso(),
        clock: core.clock.tick(),
    });

    emit(core, publisher, &record, &core.messages).await;

    Envelope::new("message", Payload::ok(core.clock.tick()))
}

fn handle_clock(core: &ServerCore, request: &Envelope) -> Envelope {
    Envelope::new(
        request.service.as_str(),
        Payload {
            time: Some(now_iso()),
            ..Payload::stamped(core.clock.tick())
        },
    )
}

/// Fan a freshly validated record out: subscriber topic, local log,
/// replica topic — in that order. The record keeps one clock value
/// across all three so peers log the identical record.
///
/// A failed log append is reported but does not fail the request; the
/// broadcast already happened and durability is not promised.
async fn emit<P: FramePublisher>(
    core: &ServerCore,
    publisher: &P,
    record: &Record,
    log: &crate::logs::RecordLog,
) {
    let bytes = match record.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "record encoding failed, nothing emitted");
            return;
        }
    };

    if let Err(e) = publisher.publish(record.topic(), bytes.clone()).await {
        warn!(topic = %record.topic(), error = %e, "subscriber broadcast failed");
    }

    if let Err(e) = log.append(record).await {
        error!(path = %log.path().display(), error = %e, "log append failed");
    }

    if let Err(e) = publisher.publish(topics::REPLICA, bytes).await {
        warn!(error = %e, "replica broadcast failed");
    }
}
