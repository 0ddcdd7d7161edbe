use std::path::PathBuf;

use tagarela_messaging::{
    now_iso, CommandHandler, Envelope, LamportClock, Payload, RequestServer, Transport,
};
use tracing::{info, warn};

use crate::state::RegistryState;
use crate::RegistryError;

/// The reference service: names, ranks, liveness, and a physical clock
/// probe, behind a single request/reply socket.
///
/// Single-threaded by design — one request at a time mutates the state,
/// so no locking is needed beyond the socket itself.
pub struct RegistryService {
    state: RegistryState,
    clock: LamportClock,
}

impl RegistryService {
    /// Load persisted state from `data_file` (usually `ref_servers.json`).
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        let state = RegistryState::load(data_file);
        info!(
            path = %state.path().display(),
            known_servers = state.servers().len(),
            "registry state loaded"
        );
        Self {
            state,
            clock: LamportClock::new(),
        }
    }

    /// Bind the endpoint and serve requests until the socket fails.
    pub async fn run(mut self, transport: &Transport) -> Result<(), RegistryError> {
        let socket = RequestServer::bind(transport).await?;
        info!(endpoint = %transport, "registry listening");

        loop {
            let (token, request) = match socket.recv_request().await {
                Ok(pair) => pair,
                Err(e) => {
                    // Malformed frames are dropped; the loop keeps serving.
                    warn!(error = %e, "dropping undecodable request");
                    continue;
                }
            };

            self.clock.observe(request.data.clock);
            let reply = self.dispatch(&request);

            if let Err(e) = socket.send_reply(token, reply).await {
                warn!(error = %e, "failed to send reply");
            }
        }
    }

    /// Route one request to its handler and build the reply envelope.
    fn dispatch(&mut self, request: &Envelope) -> Envelope {
        match request.service.as_str() {
            "rank" => self.handle_rank(request),
            "list" => self.handle_list(request),
            "heartbeat" => self.handle_heartbeat(request),
            "clock" => self.handle_clock(request),
            other => {
                warn!(service = %other, "unknown service");
                Envelope::new(
                    other,
                    Payload::erro("serviço desconhecido", self.clock.tick()),
                )
            }
        }
    }

    fn handle_rank(&mut self, request: &Envelope) -> Envelope {
        let Some(name) = request.data.user.as_deref() else {
            return Envelope::new(
                "rank",
                Payload::erro("usuário não informado", self.clock.tick()),
            );
        };

        match self.state.rank(name) {
            Ok(rank) => {
                info!(server = %name, rank, "rank assigned");
                Envelope::new(
                    "rank",
                    Payload {
                        rank: Some(rank),
                        ..Payload::stamped(self.clock.tick())
                    },
                )
            }
            Err(e) => {
                warn!(server = %name, error = %e, "rank persistence failed");
                Envelope::new(
                    "rank",
                    Payload::erro("falha ao persistir rank", self.clock.tick()),
                )
            }
        }
    }

    fn handle_list(&self, _request: &Envelope) -> Envelope {
        Envelope::new(
            "list",
            Payload {
                list: Some(self.state.servers().clone()),
                ..Payload::stamped(self.clock.tick())
            },
        )
    }

    fn handle_heartbeat(&mut self, request: &Envelope) -> Envelope {
        if let Some(name) = request.data.user.as_deref() {
            match self.state.heartbeat(name) {
                Ok(true) => {}
                // Unknown names are ignored, never auto-registered.
                Ok(false) => warn!(server = %name, "heartbeat from unregistered server"),
                Err(e) => warn!(server = %name, error = %e, "heartbeat persistence failed"),
            }
        }
        Envelope::new("heartbeat", Payload::stamped(self.clock.tick()))
    }

    /// Physical clock probe backing the simplified Berkeley sync hook.
    /// Returns wall-clock time; no offsets are computed or applied.
    fn handle_clock(&self, _request: &Envelope) -> Envelope {
        Envelope::new(
            "clock",
            Payload {
                time: Some(now_iso()),
                ..Payload::stamped(self.clock.tick())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_in(dir: &tempfile::TempDir) -> RegistryService {
        RegistryService::new(dir.path().join("ref_servers.json"))
    }

    fn request(service: &str, user: Option<&str>, clock: u64) -> Envelope {
        Envelope::new(
            service,
            Payload {
                user: user.map(String::from),
                ..Payload::stamped(clock)
            },
        )
    }

    #[test]
    fn rank_then_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir);

        let reply = service.dispatch(&request("rank", Some("srv1"), 0));
        assert_eq!(reply.service, "rank");
        assert_eq!(reply.data.rank, Some(1));

        let reply = service.dispatch(&request("rank", Some("srv2"), 0));
        assert_eq!(reply.data.rank, Some(2));

        let reply = service.dispatch(&request("list", None, 0));
        let list = reply.data.list.unwrap();
        assert_eq!(list["srv1"].rank, 1);
        assert_eq!(list["srv2"].rank, 2);
    }

    #[test]
    fn rank_requires_a_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir);

        let reply = service.dispatch(&request("rank", None, 0));
        assert_eq!(reply.data.status.as_deref(), Some("erro"));
    }

    #[test]
    fn unknown_service_replies_erro() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir);

        let reply = service.dispatch(&request("frobnicate", None, 0));
        assert_eq!(reply.service, "frobnicate");
        assert_eq!(reply.data.status.as_deref(), Some("erro"));
        assert_eq!(reply.data.message.as_deref(), Some("serviço desconhecido"));
    }

    #[test]
    fn clock_probe_returns_physical_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir);

        let reply = service.dispatch(&request("clock", None, 0));
        assert_eq!(reply.service, "clock");
        assert!(reply.data.time.unwrap().ends_with('Z'));
    }

    #[test]
    fn every_reply_advances_the_lamport_clock() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir);

        let first = service.dispatch(&request("list", None, 0)).data.clock;
        let second = service.dispatch(&request("list", None, 0)).data.clock;
        assert!(second > first);

        // A remote clock far ahead drags the local one past it.
        service.clock.observe(1000);
        let third = service.dispatch(&request("list", None, 0)).data.clock;
        assert!(third > 1000);
    }

    #[test]
    fn heartbeat_ignores_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_in(&dir);

        let reply = service.dispatch(&request("heartbeat", Some("ghost"), 0));
        assert_eq!(reply.service, "heartbeat");

        let reply = service.dispatch(&request("list", None, 0));
        assert!(reply.data.list.unwrap().is_empty());
    }
}
