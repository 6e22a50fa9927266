//! Test helpers for end-to-end tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use robo_broker::Broker;
use robo_gateway::{GatewayConfig, GatewayState};
use robo_server::{Coordinator, CoordinatorConfig, RunningSystem, ShutdownReport};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Default test timeout.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A running robocore on a loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    running: RunningSystem,
}

impl TestGateway {
    /// Start with default settings.
    pub async fn start() -> Self {
        Self::start_with(|config| config).await
    }

    /// Start with settings adjusted by `configure`.
    pub async fn start_with(configure: impl FnOnce(CoordinatorConfig) -> CoordinatorConfig) -> Self {
        let gateway = GatewayConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        let config = configure(
            CoordinatorConfig::new(gateway).with_shutdown_grace(Duration::from_secs(3)),
        );

        let running = Coordinator::local(config, vec!["sensors".to_string()])
            .start()
            .await
            .unwrap();

        Self {
            addr: running.gateway_addr(),
            running,
        }
    }

    /// WebSocket endpoint URL.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/v1/ws", self.addr)
    }

    /// The gateway's broker.
    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(self.running.broker())
    }

    /// The gateway's shared state.
    pub fn state(&self) -> Arc<GatewayState> {
        Arc::clone(self.running.state())
    }

    /// Issue an HTTP request and read the whole response.
    pub async fn http(&self, method: &str, path: &str, body: Option<&str>) -> HttpResponse {
        http_request(self.addr, method, path, body).await
    }

    /// Shut down and return the report.
    pub async fn shutdown(self) -> ShutdownReport {
        timeout(TEST_TIMEOUT, self.running.shutdown()).await.unwrap()
    }
}

/// A parsed HTTP/1.1 response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: String,
    pub body: String,
}

impl HttpResponse {
    /// Body parsed as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Minimal HTTP/1.1 client over a raw socket.
pub async fn http_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> HttpResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = body.unwrap_or_default();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    timeout(TEST_TIMEOUT, stream.read_to_string(&mut raw))
        .await
        .unwrap()
        .unwrap();

    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw.as_str(), ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_default();
    HttpResponse {
        status,
        headers: head.to_string(),
        body: body.to_string(),
    }
}

/// A WebSocket client speaking the envelope protocol.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to a gateway's WebSocket endpoint.
    pub async fn connect(url: &str) -> Result<Self, String> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| format!("Failed to connect: {e}"))?;
        Ok(Self { ws })
    }

    /// Send raw text.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), String> {
        self.ws
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| e.to_string())
    }

    /// Send a JSON value.
    pub async fn send_json(&mut self, value: &Value) -> Result<(), String> {
        self.send_text(value.to_string()).await
    }

    /// Next text frame parsed as JSON, skipping control frames.
    pub async fn recv_json(&mut self) -> Result<Value, String> {
        loop {
            let msg = timeout(TEST_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| "Timeout waiting for message")?
                .ok_or("Connection closed")?
                .map_err(|e| e.to_string())?;

            match msg {
                WsMessage::Text(text) => return serde_json::from_str(&text).map_err(|e| e.to_string()),
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                other => return Err(format!("Expected text message, got {other:?}")),
            }
        }
    }

    /// Wait for a close frame and return its code. Text frames before it are
    /// collected into `received`.
    pub async fn recv_close(&mut self, received: &mut Vec<Value>) -> Result<u16, String> {
        loop {
            let msg = timeout(TEST_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| "Timeout waiting for close")?
                .ok_or("Stream ended without close frame")?
                .map_err(|e| e.to_string())?;

            match msg {
                WsMessage::Close(Some(frame)) => return Ok(u16::from(frame.code)),
                WsMessage::Close(None) => return Err("Close frame without code".into()),
                WsMessage::Text(text) => {
                    received.push(serde_json::from_str(&text).map_err(|e| e.to_string())?);
                }
                _ => {}
            }
        }
    }

    /// Subscribe and wait for the ack.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), String> {
        self.send_json(&serde_json::json!({"type": "subscribe", "topic": topic}))
            .await?;
        let ack = self.recv_json().await?;
        if ack == serde_json::json!({"type": "subscribed", "topic": topic}) {
            Ok(())
        } else {
            Err(format!("Expected subscribed ack, got {ack}"))
        }
    }

    /// Publish a payload.
    pub async fn publish(&mut self, topic: &str, payload: Value) -> Result<(), String> {
        self.send_json(&serde_json::json!({"type": "publish", "topic": topic, "payload": payload}))
            .await
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Poll `condition` until it holds or the test timeout passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
