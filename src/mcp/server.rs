//! MCP server with stdio transport
//!
//! Implements a JSON-RPC 2.0 server over newline-delimited stdin/stdout.
//! Requests are handled concurrently and their responses funnel through a
//! single writer task, so a slow `execute_editor_command` never blocks
//! `get_logs`.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use super::resources::ResourceCatalog;
use super::tools::{ToolCall, ToolHandler, ToolName};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// MCP protocol revision we speak
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// How long tool calls wait for the Editor to (re)connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ConnectionRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&RelayConfig> for ConnectionRetry {
    fn from(config: &RelayConfig) -> Self {
        Self {
            attempts: config.connect_retry_attempts,
            delay: config.connect_retry_delay(),
        }
    }
}

/// MCP server that handles JSON-RPC requests over stdio
#[derive(Clone)]
pub struct McpServer {
    tool_handler: Arc<ToolHandler>,
    resources: Arc<ResourceCatalog>,
    retry: ConnectionRetry,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(tool_handler: ToolHandler, resources: ResourceCatalog, retry: ConnectionRetry) -> Self {
        Self {
            tool_handler: Arc::new(tool_handler),
            resources: Arc::new(resources),
            retry,
        }
    }

    /// Serve stdin/stdout until EOF
    pub async fn run(&self) -> Result<()> {
        info!("MCP server started, listening on stdin...");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut lines = BufReader::new(reader).lines();
        let mut in_flight = JoinSet::new();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    debug!("Received request: {}", line);

                    let server = self.clone();
                    let tx = tx.clone();
                    in_flight.spawn(async move {
                        if let Some(response) = server.process_line(&line).await {
                            let _ = tx.send(encode_response(&response));
                        }
                    });
                }
                Ok(None) => {
                    debug!("Received EOF, shutting down");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from stdin: {}", e);
                    break;
                }
            }

            // Reap finished handlers so the set does not grow unbounded
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("Request handler panicked: {}", e);
                }
            }
        }

        // Requests already received still get their answers
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Request handler panicked: {}", e);
            }
        }
        drop(tx);

        if let Err(e) = writer_task.await {
            error!("Response writer failed: {}", e);
        }
        info!("MCP server shutting down");
        Ok(())
    }

    /// Handle one raw line; `None` for notifications
    pub async fn process_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
                ))
            }
        };

        let id = value.get("id").cloned().filter(|id| !id.is_null());
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request(format!("Invalid request: {}", e)),
                ))
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return request.id.clone().map(|id| {
                JsonRpcResponse::error(
                    Some(id),
                    JsonRpcError::invalid_request("jsonrpc must be '2.0'"),
                )
            });
        }

        if request.is_notification() {
            debug!("Notification: {}", request.method);
            return None;
        }

        Some(self.process_request(request).await)
    }

    async fn process_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => self.handle_tools_call(request).await,
            "resources/list" => self.handle_resources_list(request),
            "resources/read" => self.handle_resources_read(request).await,
            _ => {
                JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method))
            }
        }
    }

    fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling initialize");

        JsonRpcResponse::success(
            request.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": {},
                    "resources": {}
                }
            }),
        )
    }

    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(request.id, json!({ "tools": self.tool_handler.list_tools() }))
    }

    async fn handle_tools_call(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params = match request.params.as_object() {
            Some(obj) => obj,
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("params must be an object"),
                );
            }
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(name) => name,
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("missing 'name' field"),
                );
            }
        };

        let tool = match ToolName::parse(name) {
            Some(tool) => tool,
            None => {
                warn!("Unknown tool: {}", name);
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::unknown_tool(name, &ToolName::names()),
                );
            }
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        // Arguments are checked before any wait for the Editor
        let result: Result<Value> = async {
            let call = ToolCall::parse(tool, arguments)?;
            if tool.requires_editor() {
                self.ensure_editor().await?;
            }
            self.tool_handler.run(call).await
        }
        .await;

        match result {
            Ok(result) => JsonRpcResponse::success(
                request.id,
                json!({
                    "content": [
                        {
                            "type": "text",
                            "text": serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string())
                        }
                    ]
                }),
            ),
            Err(e) => {
                if let RelayError::RemoteExecution {
                    stack_trace: Some(trace),
                    ..
                } = &e
                {
                    warn!("{} failed in the Editor: {}\n{}", tool, e, trace);
                } else {
                    warn!("{} failed: {}", tool, e);
                }
                JsonRpcResponse::error(request.id, JsonRpcError::from(&e))
            }
        }
    }

    /// Bounded wait for the Editor before a tool that needs it
    async fn ensure_editor(&self) -> Result<()> {
        let session = self.tool_handler.session();
        if session.is_connected() {
            return Ok(());
        }

        for attempt in 1..=self.retry.attempts {
            info!(
                "Unity Editor not connected, waiting (attempt {}/{})",
                attempt, self.retry.attempts
            );
            if session.wait_for_connection(self.retry.delay).await {
                return Ok(());
            }
        }

        Err(RelayError::NotConnected)
    }

    fn handle_resources_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(request.id, json!({ "resources": self.resources.list() }))
    }

    async fn handle_resources_read(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let uri = match request.params.get("uri").and_then(|v| v.as_str()) {
            Some(uri) => uri,
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("missing 'uri' field"),
                )
            }
        };

        match self.resources.read(uri).await {
            Some(contents) => JsonRpcResponse::success(request.id, json!({ "contents": [contents] })),
            None => JsonRpcResponse::error(
                request.id,
                JsonRpcError::method_not_found(format!("resource {}", uri)),
            ),
        }
    }
}

fn encode_response(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to serialize response: {}", e);
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "error": {"code": -32603, "message": format!("Serialization error: {}", e)},
            "id": response.id
        })
        .to_string()
    })
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        debug!("Sending response: {}", line);
        let written: std::io::Result<()> = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            error!("Failed to write response: {}", e);
            break;
        }
    }
}
