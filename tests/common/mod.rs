//! Common test utilities and helpers
//!
//! `FakeEditor` plays the Unity plugin: a real WebSocket client connected to
//! the relay's endpoint.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use unity_mcp_relay::mcp::JsonRpcResponse;
use unity_mcp_relay::{Relay, RelayConfig};

/// Upper bound for anything a test waits on
pub const TEST_WAIT: Duration = Duration::from_secs(5);

/// Config bound to an ephemeral port with short waits
pub fn test_config() -> RelayConfig {
    RelayConfig {
        port: 0,
        command_timeout_ms: 2_000,
        state_timeout_ms: 2_000,
        connect_retry_attempts: 1,
        connect_retry_delay_ms: 200,
        ..Default::default()
    }
}

/// Start a relay on an ephemeral port
pub async fn start_relay() -> Relay {
    Relay::start(&test_config())
        .await
        .expect("Failed to start relay")
}

/// Connect a fake Editor and wait until the relay tracks it
pub async fn connect_editor(relay: &Relay) -> FakeEditor {
    let editor = FakeEditor::connect(relay.addr()).await;
    assert!(
        relay.session().wait_for_connection(TEST_WAIT).await,
        "relay never saw the editor connect"
    );
    editor
}

/// Send one JSON-RPC request straight to the MCP server
pub async fn rpc(relay: &Relay, request: Value) -> JsonRpcResponse {
    relay
        .server()
        .process_line(&request.to_string())
        .await
        .expect("request should get a response")
}

/// Poll `get_logs` until the buffer holds `count` records
pub async fn wait_for_log_count(relay: &Relay, count: usize) -> Value {
    let deadline = tokio::time::Instant::now() + TEST_WAIT;
    loop {
        let response = rpc(relay, tool_call(0, "get_logs", json!({}))).await;
        let payload = tool_payload(&response);
        if payload.as_array().map(|logs| logs.len()) == Some(count) {
            return payload;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "buffer never reached {} records: {}",
            count,
            payload
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Build a `tools/call` request
pub fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

/// Parse the JSON carried in a successful tool result
pub fn tool_payload(response: &JsonRpcResponse) -> Value {
    let result = response
        .result
        .as_ref()
        .unwrap_or_else(|| panic!("Expected success, got {:?}", response.error));
    let text = result["content"][0]["text"]
        .as_str()
        .expect("tool result should carry text content");
    serde_json::from_str(text).expect("tool text should be JSON")
}

/// A Unity Editor stand-in
pub struct FakeEditor {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FakeEditor {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{}", addr))
            .await
            .expect("Failed to connect fake editor");
        Self { ws }
    }

    pub async fn send_json(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string()))
            .await
            .expect("Failed to send frame");
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("Failed to send frame");
    }

    pub async fn send_log(&mut self, level: &str, message: &str) {
        self.send_json(json!({
            "type": "log",
            "data": {
                "message": message,
                "stackTrace": "",
                "logType": level,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
        .await;
    }

    /// Next request envelope sent by the relay
    pub async fn next_request(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(TEST_WAIT, self.ws.next())
                .await
                .expect("timed out waiting for a request")
                .expect("connection closed")
                .expect("websocket error");
            match frame {
                Message::Text(text) => return serde_json::from_str(&text).expect("invalid JSON"),
                Message::Close(_) => panic!("relay closed the connection"),
                _ => continue,
            }
        }
    }

    /// True once the relay sends a close frame or drops the socket
    pub async fn closed_by_relay(&mut self) -> bool {
        loop {
            match tokio::time::timeout(TEST_WAIT, self.ws.next()).await {
                Err(_) => return false,
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
