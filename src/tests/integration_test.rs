use crate::broker::{Broker, Headers, Message};
use crate::client::Client;
use crate::config::Settings;
use crate::transport::codec::{JsonCodec, WireCodec};
use crate::transport::server::Server;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn start_broker(max_connections: usize) -> (Broker, SocketAddr) {
    let mut settings = Settings::default();
    settings.server.port = 0;
    settings.broker.max_connections = max_connections;

    let broker = Broker::new();
    let server = Server::bind(&settings, broker.clone())
        .await
        .expect("bind broker");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(server.run());
    (broker, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    Client::connect(&addr.ip().to_string(), addr.port())
        .await
        .expect("connect client")
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next(client: &mut Client) -> Message {
    timeout(Duration::from_secs(2), client.next_message())
        .await
        .expect("no delivery in time")
        .expect("read failed")
        .expect("broker closed the connection")
}

#[tokio::test]
async fn subscriber_receives_published_payload() {
    let (broker, addr) = start_broker(0).await;
    let mut c1 = connect(addr).await;
    let mut c2 = connect(addr).await;

    c1.subscribe("orders").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("orders") == 1).await;

    c2.publish("orders", json!({"x": 1})).await.unwrap();

    let msg = next(&mut c1).await;
    assert_eq!(msg.topic(), "orders");
    assert_eq!(msg.payload(), &json!({"x": 1}));
    assert!(msg.headers().is_empty());
}

#[tokio::test]
async fn raw_publish_frame_is_delivered_as_msg_frame() {
    let (broker, addr) = start_broker(0).await;
    let mut c1 = connect(addr).await;
    c1.subscribe("orders").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("orders") == 1).await;

    let body = br#"{"payload":{"x":1},"headers":{}}"#;
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let mut frame = format!("pub orders {}\n", body.len()).into_bytes();
    frame.extend_from_slice(body);
    for byte in frame {
        raw.write_all(&[byte]).await.unwrap();
    }

    let msg = next(&mut c1).await;
    assert_eq!(msg.payload(), &json!({"x": 1}));
}

#[tokio::test]
async fn headers_survive_the_round_trip() {
    let (broker, addr) = start_broker(0).await;
    let mut sub = connect(addr).await;
    let mut publisher = connect(addr).await;
    sub.subscribe("vehicle.telemetry").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("vehicle.telemetry") == 1).await;

    let mut headers = Headers::new();
    headers.insert("source".to_string(), "vehicle:1".to_string());
    let payload = json!({"plate": "3456ABC", "speed": 50, "battery": 0.81});
    publisher
        .publish_with_headers("vehicle.telemetry", payload.clone(), headers.clone())
        .await
        .unwrap();

    let msg = next(&mut sub).await;
    assert_eq!(msg.payload(), &payload);
    assert_eq!(msg.headers(), &headers);
}

#[tokio::test]
async fn publish_without_subscribers_attempts_no_delivery() {
    let (broker, addr) = start_broker(0).await;
    let mut publisher = connect(addr).await;

    publisher.publish("alerts", json!({"level": "high"})).await.unwrap();

    wait_until(|| broker.stats().dispatched == 1).await;
    assert_eq!(broker.stats().deliveries, 0);
    assert_eq!(broker.stats().failed, 0);
}

#[tokio::test]
async fn disconnected_subscriber_gets_nothing_and_pipeline_keeps_running() {
    let (broker, addr) = start_broker(0).await;
    let mut leaving = connect(addr).await;
    let mut staying = connect(addr).await;
    let mut publisher = connect(addr).await;

    leaving.subscribe("t").await.unwrap();
    staying.subscribe("other").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("t") == 1).await;
    wait_until(|| broker.registry().subscriber_count("other") == 1).await;

    leaving.close().await.unwrap();
    wait_until(|| broker.registry().subscriber_count("t") == 0).await;

    publisher.publish("t", json!(1)).await.unwrap();
    publisher.publish("other", json!(2)).await.unwrap();

    let msg = next(&mut staying).await;
    assert_eq!(msg.payload(), &json!(2));
    wait_until(|| broker.stats().dispatched == 2).await;
    assert_eq!(broker.stats().published, 2);
    assert_eq!(broker.stats().deliveries, 1);
}

#[tokio::test]
async fn messages_arrive_in_publish_order() {
    let (broker, addr) = start_broker(0).await;
    let mut sub = connect(addr).await;
    let mut publisher = connect(addr).await;
    sub.subscribe("seq").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("seq") == 1).await;

    for i in 0..50 {
        publisher.publish("seq", json!(i)).await.unwrap();
    }
    for i in 0..50 {
        assert_eq!(next(&mut sub).await.payload(), &json!(i));
    }
}

#[tokio::test]
async fn every_subscriber_of_a_topic_receives_the_message() {
    let (broker, addr) = start_broker(0).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let mut publisher = connect(addr).await;
    a.subscribe("t").await.unwrap();
    b.subscribe("t").await.unwrap();
    // a duplicate subscription must not double deliveries
    b.subscribe("t").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("t") == 2).await;

    publisher.publish("t", json!("fan-out")).await.unwrap();

    assert_eq!(next(&mut a).await.payload(), &json!("fan-out"));
    assert_eq!(next(&mut b).await.payload(), &json!("fan-out"));
    wait_until(|| broker.stats().dispatched == 1).await;
    assert_eq!(broker.stats().deliveries, 2);
}

#[tokio::test]
async fn unsubscribe_stops_deliveries_for_that_topic() {
    let (broker, addr) = start_broker(0).await;
    let mut sub = connect(addr).await;
    let mut publisher = connect(addr).await;
    sub.subscribe("a").await.unwrap();
    sub.subscribe("b").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("b") == 1).await;

    sub.unsubscribe("a").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("a") == 0).await;

    publisher.publish("a", json!("dropped")).await.unwrap();
    publisher.publish("b", json!("kept")).await.unwrap();

    assert_eq!(next(&mut sub).await.payload(), &json!("kept"));
}

#[tokio::test]
async fn malformed_commands_do_not_close_the_connection() {
    let (broker, addr) = start_broker(0).await;
    let mut sub = connect(addr).await;
    sub.subscribe("t").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("t") == 1).await;

    let body = JsonCodec.encode(&json!("still alive"), &Headers::new()).unwrap();
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let mut bytes = b"FOO bar\nSUB\nPUB t notanumber\nPUB t 4\nnope".to_vec();
    bytes.extend_from_slice(format!("PUB t {}\n", body.len()).as_bytes());
    bytes.extend_from_slice(&body);
    raw.write_all(&bytes).await.unwrap();

    assert_eq!(next(&mut sub).await.payload(), &json!("still alive"));
    assert_eq!(broker.stats().published, 1);
}

#[tokio::test]
async fn listen_invokes_callback_per_delivery() {
    let (broker, addr) = start_broker(0).await;
    let mut sub = connect(addr).await;
    let mut publisher = connect(addr).await;
    sub.subscribe("t").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("t") == 1).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = tokio::spawn(async move {
        sub.listen(|msg| {
            let _ = tx.send(msg.payload().clone());
        })
        .await
    });

    publisher.publish("t", json!("one")).await.unwrap();
    publisher.publish("t", json!("two")).await.unwrap();

    for expected in [json!("one"), json!("two")] {
        let got = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no callback in time")
            .expect("listener ended");
        assert_eq!(got, expected);
    }
    listener.abort();
}

#[tokio::test]
async fn connection_limit_rejects_extra_clients() {
    let (broker, addr) = start_broker(1).await;
    let mut first = connect(addr).await;
    first.subscribe("t").await.unwrap();
    wait_until(|| broker.registry().subscriber_count("t") == 1).await;

    let mut second = connect(addr).await;
    let result = timeout(Duration::from_secs(2), second.next_message())
        .await
        .expect("rejected connection was not closed");
    assert!(!matches!(result, Ok(Some(_))));
}
