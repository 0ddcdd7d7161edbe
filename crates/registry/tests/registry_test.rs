//! Integration test: the registry behind a real ROUTER socket, driven
//! by a DEALER client the way application servers drive it.

use std::time::Duration;

use tagarela_messaging::{Envelope, Payload, RequestClient, RequestSender, Transport};
use tagarela_registry::RegistryService;

const SETTLE: Duration = Duration::from_millis(200);
const TIMEOUT: Duration = Duration::from_secs(5);

fn request(service: &str, user: Option<&str>, clock: u64) -> Envelope {
    Envelope::new(
        service,
        Payload {
            user: user.map(String::from),
            ..Payload::stamped(clock)
        },
    )
}

#[tokio::test]
async fn rank_heartbeat_list_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Transport::tcp("127.0.0.1", 16700);

    let data_file = dir.path().join("ref_servers.json");
    let service_transport = transport.clone();
    let registry = tokio::spawn(async move {
        let service = RegistryService::new(data_file);
        let _ = service.run(&service_transport).await;
    });
    tokio::time::sleep(SETTLE).await;

    let client = RequestClient::connect(&transport).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    // First sight assigns rank 1; repeat call returns the same rank.
    let reply = client
        .request(request("rank", Some("srv1"), 1), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply.data.rank, Some(1));

    let reply = client
        .request(request("rank", Some("srv1"), 2), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply.data.rank, Some(1));

    let reply = client
        .request(request("heartbeat", Some("srv1"), 3), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply.service, "heartbeat");

    let reply = client
        .request(request("list", None, 4), TIMEOUT)
        .await
        .unwrap();
    let list = reply.data.list.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list["srv1"].rank, 1);
    assert!(list["srv1"].last_beat > 0.0);

    // Reply clocks advance past what the client sends.
    let reply = client
        .request(request("clock", None, 100), TIMEOUT)
        .await
        .unwrap();
    assert!(reply.data.clock > 100);
    assert!(reply.data.time.is_some());

    registry.abort();
}
