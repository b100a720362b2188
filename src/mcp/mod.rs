//! Model Context Protocol (MCP) server implementation
//!
//! Provides a JSON-RPC 2.0 server over stdio exposing the Unity Editor tools
//! and the help resources.

pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use resources::{ResourceCatalog, ResourceContents, ResourceDefinition};
pub use server::{ConnectionRetry, McpServer};
pub use tools::{StateFormat, ToolCall, ToolHandler, ToolName};
