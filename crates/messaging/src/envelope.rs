use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::records::ServerIdentity;

/// Current UTC time as an ISO-8601 string with a trailing `Z`.
///
/// This is the timestamp format carried on every wire frame and log
/// record. Timestamps are advisory; ordering comes from Lamport clocks.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Wire envelope for all request/reply traffic: `{service, data}`.
///
/// Serialized with MessagePack. Requests and replies share the shape;
/// a reply mirrors the request's `service` and carries a fresh
/// `timestamp` and `clock` in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub service: String,

    #[serde(default)]
    pub data: Payload,
}

impl Envelope {
    pub fn new(service: impl Into<String>, data: Payload) -> Self {
        Self {
            service: service.into(),
            data,
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Field bag carried in `Envelope::data`.
///
/// The wire contract is a loose map: each service reads the fields it
/// needs and ignores the rest. Absent fields are omitted from the
/// encoded map entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,

    /// `"OK"` on success, `"erro"` on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,

    /// Full server map returned by the registry's `list` service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<BTreeMap<String, ServerIdentity>>,

    /// Physical time sample returned by the `clock` services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// Lamport clock stamped by the sender. Defaults to zero for
    /// participants that do not track causality.
    #[serde(default)]
    pub clock: u64,
}

impl Payload {
    /// A payload carrying only the stamp fields every frame needs.
    pub fn stamped(clock: u64) -> Self {
        Self {
            timestamp: Some(now_iso()),
            clock,
            ..Self::default()
        }
    }

    /// An `OK` reply payload.
    pub fn ok(clock: u64) -> Self {
        Self {
            status: Some("OK".into()),
            ..Self::stamped(clock)
        }
    }

    /// An `erro` reply payload with a human-readable message.
    pub fn erro(message: impl Into<String>, clock: u64) -> Self {
        Self {
            status: Some("erro".into()),
            message: Some(message.into()),
            ..Self::stamped(clock)
        }
    }

    /// Whether this payload reports success.
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("OK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::new(
            "publish",
            Payload {
                user: Some("alice".into()),
                channel: Some("general".into()),
                message: Some("hi".into()),
                ..Payload::stamped(7)
            },
        );

        let bytes = env.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.service, "publish");
        assert_eq!(decoded.data.user.as_deref(), Some("alice"));
        assert_eq!(decoded.data.channel.as_deref(), Some("general"));
        assert_eq!(decoded.data.clock, 7);
        assert!(decoded.data.timestamp.is_some());
    }

    #[test]
    fn absent_fields_stay_absent() {
        let env = Envelope::new("users", Payload::default());
        let bytes = env.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();
        assert!(decoded.data.user.is_none());
        assert!(decoded.data.status.is_none());
        assert_eq!(decoded.data.clock, 0);
    }

    #[test]
    fn missing_data_defaults() {
        // A bare {service} map must still decode.
        #[derive(Serialize)]
        struct Bare<'a> {
            service: &'a str,
        }
        let bytes = rmp_serde::to_vec_named(&Bare { service: "users" }).unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.service, "users");
        assert_eq!(decoded.data.clock, 0);
    }

    #[test]
    fn erro_payload_shape() {
        let p = Payload::erro("serviço desconhecido", 3);
        assert_eq!(p.status.as_deref(), Some("erro"));
        assert_eq!(p.message.as_deref(), Some("serviço desconhecido"));
        assert!(!p.is_ok());
    }

    #[test]
    fn ok_payload_is_ok() {
        assert!(Payload::ok(1).is_ok());
    }

    #[test]
    fn now_iso_has_trailing_z() {
        assert!(now_iso().ends_with('Z'));
    }
}
