//! Integration tests for the topic proxy: publisher → SUB frontend →
//! PUB backend → subscribers, with prefix filtering at the edge.

use std::time::Duration;

use tagarela_messaging::proxy::{TopicProxy, TopicProxyConfig};
use tagarela_messaging::{
    FramePublisher, FrameSubscriber, MessageRecord, Publisher, Record, Subscriber, Transport,
};

const SETTLE: Duration = Duration::from_millis(200);
const TIMEOUT: Duration = Duration::from_secs(3);

fn spawn_proxy(frontend_port: u16, backend_port: u16) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let proxy = TopicProxy::new(TopicProxyConfig::tcp(
            "127.0.0.1",
            frontend_port,
            backend_port,
        ));
        let _ = proxy.run().await;
    })
}

#[tokio::test]
async fn fan_out_to_matching_subscribers() {
    let proxy = spawn_proxy(16620, 16621);
    tokio::time::sleep(SETTLE).await;

    let publisher = Publisher::connect(&Transport::tcp("127.0.0.1", 16620))
        .await
        .unwrap();

    let backend = Transport::tcp("127.0.0.1", 16621);
    let sub_general = Subscriber::connect(&backend).await.unwrap();
    let sub_all = Subscriber::connect(&backend).await.unwrap();
    let sub_other = Subscriber::connect(&backend).await.unwrap();

    sub_general.subscribe("general").await.unwrap();
    sub_all.subscribe("").await.unwrap();
    sub_other.subscribe("random").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    publisher
        .publish("general", b"payload".to_vec())
        .await
        .unwrap();

    let (topic, payload) = tokio::time::timeout(TIMEOUT, sub_general.recv())
        .await
        .expect("matching subscriber timed out")
        .unwrap();
    assert_eq!(topic, "general");
    assert_eq!(payload, b"payload");

    let (topic, _) = tokio::time::timeout(TIMEOUT, sub_all.recv())
        .await
        .expect("catch-all subscriber timed out")
        .unwrap();
    assert_eq!(topic, "general");

    let filtered = tokio::time::timeout(Duration::from_millis(300), sub_other.recv()).await;
    assert!(filtered.is_err(), "non-matching subscriber must stay quiet");

    proxy.abort();
}

#[tokio::test]
async fn records_survive_the_proxy_hop() {
    let proxy = spawn_proxy(16630, 16631);
    tokio::time::sleep(SETTLE).await;

    let publisher = Publisher::connect(&Transport::tcp("127.0.0.1", 16630))
        .await
        .unwrap();
    let subscriber = Subscriber::connect(&Transport::tcp("127.0.0.1", 16631))
        .await
        .unwrap();
    subscriber.subscribe("bob").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let record = Record::Message(MessageRecord {
        origin: "srv1".into(),
        src: "alice".into(),
        dst: "bob".into(),
        message: "yo".into(),
        timestamp: "2026-08-01T12:00:00.000000Z".into(),
        clock: 11,
    });
    publisher
        .publish(record.topic(), record.to_bytes().unwrap())
        .await
        .unwrap();

    let (topic, payload) = tokio::time::timeout(TIMEOUT, subscriber.recv())
        .await
        .expect("timed out waiting for record")
        .unwrap();

    assert_eq!(topic, "bob");
    assert_eq!(Record::from_bytes(&payload).unwrap(), record);

    proxy.abort();
}
