//! Unity MCP Relay - bridge between MCP clients and a live Unity Editor
//!
//! An MCP client (an agent host) talks JSON-RPC over stdio to this process.
//! The Unity Editor plugin connects to it over WebSocket. Tool calls become
//! correlated WebSocket requests; console logs stream back into a ring buffer
//! that agents can query.
//!
//! # Architecture
//!
//! - **Types**: wire data structures (LogRecord, EditorStateSnapshot, ...)
//! - **Bridge**: WebSocket endpoint, message routing, pending exchanges, session
//! - **MCP**: JSON-RPC server, tools and resources
//!
//! # Example
//!
//! ```ignore
//! use unity_mcp_relay::{Relay, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RelayConfig::load(None)?;
//!     let relay = Relay::start(&config).await?;
//!     relay.server().run().await?;
//!     relay.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod mcp;
pub mod relay;
pub mod types;

// Re-export commonly used types
pub use bridge::{EditorSession, LogBuffer, LogQuery, UnityEndpoint};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use mcp::{McpServer, ToolHandler};
pub use relay::Relay;
pub use types::{
    CommandResult, EditorStateSnapshot, ErrorDetails, LogLevel, LogRecord, PlayModeState,
    RequestId, SceneNode,
};
