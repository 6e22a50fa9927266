//! End-to-end tests for the WebSocket pub/sub protocol.
//!
//! These tests verify:
//! 1. Subscribe/publish fan-out between two real clients
//! 2. Protocol errors are reported without closing the connection
//! 3. Oversized frames close the connection with 1009
//! 4. Disconnects release every broker subscription
//! 5. The HTTP API and the bus share one broker

mod helpers;

use bytes::Bytes;
use helpers::*;
use robo_gateway::HubConfig;
use serde_json::json;

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_published_message_reaches_subscriber() {
    let gateway = TestGateway::start().await;
    let mut subscriber = TestClient::connect(&gateway.ws_url()).await.unwrap();
    let mut publisher = TestClient::connect(&gateway.ws_url()).await.unwrap();

    subscriber.subscribe("sensors").await.unwrap();
    publisher.publish("sensors", json!({"t": 1})).await.unwrap();

    let delivered = subscriber.recv_json().await.unwrap();
    assert_eq!(
        delivered,
        json!({"type": "message", "topic": "sensors", "payload": {"t": 1}})
    );

    subscriber.close().await;
    publisher.close().await;
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_every_subscriber_receives() {
    let gateway = TestGateway::start().await;
    let mut a = TestClient::connect(&gateway.ws_url()).await.unwrap();
    let mut b = TestClient::connect(&gateway.ws_url()).await.unwrap();
    a.subscribe("arm.state").await.unwrap();
    b.subscribe("arm.state").await.unwrap();

    gateway
        .broker()
        .publish("arm.state", Bytes::from_static(br#"{"joint":3}"#))
        .unwrap();

    for client in [&mut a, &mut b] {
        let delivered = client.recv_json().await.unwrap();
        assert_eq!(delivered["payload"], json!({"joint": 3}));
    }

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_publish_without_subscribers_is_silent() {
    let gateway = TestGateway::start().await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();

    client.publish("nobody.listens", json!(1)).await.unwrap();
    // The next frame is the ack below, not an error for the publish.
    client.subscribe("other").await.unwrap();

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let gateway = TestGateway::start().await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();
    client.subscribe("a").await.unwrap();
    client.subscribe("b").await.unwrap();

    client
        .send_json(&json!({"type": "unsubscribe", "topic": "a"}))
        .await
        .unwrap();
    assert_eq!(
        client.recv_json().await.unwrap(),
        json!({"type": "unsubscribed", "topic": "a"})
    );

    let broker = gateway.broker();
    broker.publish("a", Bytes::from_static(b"1")).unwrap();
    broker.publish("b", Bytes::from_static(b"2")).unwrap();

    let delivered = client.recv_json().await.unwrap();
    assert_eq!(delivered["topic"], "b");

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_subscribe_acks_once_delivers_once() {
    let gateway = TestGateway::start().await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();
    client.subscribe("t").await.unwrap();
    client.subscribe("t").await.unwrap();

    let broker = gateway.broker();
    assert_eq!(broker.subscriber_count("t"), 1);
    broker.publish("t", Bytes::from_static(b"\"first\"")).unwrap();
    broker.publish("t", Bytes::from_static(b"\"second\"")).unwrap();

    assert_eq!(client.recv_json().await.unwrap()["payload"], "first");
    assert_eq!(client.recv_json().await.unwrap()["payload"], "second");

    gateway.shutdown().await;
}

// ============================================================================
// Protocol errors
// ============================================================================

#[tokio::test]
async fn test_malformed_frame_reports_error_and_stays_open() {
    let gateway = TestGateway::start().await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();

    client.send_text("{this is not json").await.unwrap();
    assert_eq!(
        client.recv_json().await.unwrap(),
        json!({
            "type": "error",
            "payload": {"code": "invalid_message", "message": "Failed to parse message"}
        })
    );

    client.subscribe("still.open").await.unwrap();
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_unknown_type_reports_error() {
    let gateway = TestGateway::start().await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();

    client.send_json(&json!({"type": "teleport", "topic": "x"})).await.unwrap();
    let error = client.recv_json().await.unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["payload"]["code"], "unknown_type");

    client.subscribe("x").await.unwrap();
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_subscription_limit_enforced() {
    let gateway = TestGateway::start_with(|mut config| {
        config.gateway.hub = HubConfig::default().with_max_subscriptions(2);
        config
    })
    .await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();
    client.subscribe("one").await.unwrap();
    client.subscribe("two").await.unwrap();

    client.send_json(&json!({"type": "subscribe", "topic": "three"})).await.unwrap();
    let error = client.recv_json().await.unwrap();
    assert_eq!(error["payload"]["code"], "subscription_limit");
    assert_eq!(gateway.broker().subscriber_count("three"), 0);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_oversized_frame_closes_with_1009() {
    let gateway = TestGateway::start_with(|mut config| {
        config.gateway.hub = HubConfig::default().with_max_frame_size(1024);
        config
    })
    .await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();
    client.subscribe("big").await.unwrap();

    let blob = "x".repeat(1500);
    client.publish("big", json!(blob)).await.unwrap();

    let mut received = Vec::new();
    assert_eq!(client.recv_close(&mut received).await.unwrap(), 1009);
    assert!(received.is_empty());

    let broker = gateway.broker();
    assert!(eventually(|| broker.topic_count() == 0).await);
    gateway.shutdown().await;
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_disconnect_releases_subscriptions() {
    let gateway = TestGateway::start().await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();
    for topic in ["a", "b", "c"] {
        client.subscribe(topic).await.unwrap();
    }

    let broker = gateway.broker();
    // The core holds its own `sensors` subscription.
    assert_eq!(broker.topic_count(), 4);

    client.close().await;
    assert!(eventually(|| broker.topic_count() == 1).await);
    assert!(broker.topics_for(&"core".into()).contains(&"sensors".to_string()));

    let state = gateway.state();
    assert!(eventually(|| state.connections().active() == 0).await);
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_connection_limit_refuses_upgrade() {
    let gateway = TestGateway::start_with(|mut config| {
        config.gateway.max_connections = 1;
        config
    })
    .await;

    let _first = TestClient::connect(&gateway.ws_url()).await.unwrap();
    let second = TestClient::connect(&gateway.ws_url()).await;
    assert!(second.is_err());

    gateway.shutdown().await;
}

// ============================================================================
// HTTP and bus together
// ============================================================================

#[tokio::test]
async fn test_command_is_published_on_bus() {
    let gateway = TestGateway::start().await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();
    client.subscribe("commands").await.unwrap();

    let response = gateway
        .http(
            "POST",
            "/api/v1/command",
            Some(r#"{"action":"move","target":"arm","params":{"x":0.5}}"#),
        )
        .await;
    assert_eq!(response.status, 200);
    let accepted = response.json();
    assert_eq!(accepted["status"], "accepted");

    let event = client.recv_json().await.unwrap();
    assert_eq!(event["topic"], "commands");
    assert_eq!(event["payload"]["command_id"], accepted["command_id"]);
    assert_eq!(event["payload"]["params"], json!({"x": 0.5}));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_sensor_snapshot_follows_published_readings() {
    let gateway = TestGateway::start().await;
    let mut client = TestClient::connect(&gateway.ws_url()).await.unwrap();

    client.publish("sensors", json!({"lidar": 4.2})).await.unwrap();
    // Frames are handled in order, so the ack implies the publish was applied.
    client.subscribe("sync.point").await.unwrap();

    let snapshot = gateway.http("GET", "/api/v1/sensors", None).await.json();
    assert_eq!(snapshot["readings"]["sensors"], json!({"lidar": 4.2}));

    gateway.shutdown().await;
}
