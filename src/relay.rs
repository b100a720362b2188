//! Assembly of the running relay
//!
//! Wires the WebSocket endpoint, the session and the MCP server together from
//! a [`RelayConfig`].

use crate::bridge::{BridgeState, EditorSession, MessageRouter, SessionSettings, UnityEndpoint};
use crate::config::RelayConfig;
use crate::error::Result;
use crate::mcp::{ConnectionRetry, McpServer, ResourceCatalog, ToolHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// A started relay: the endpoint is listening, the MCP server is not yet serving
pub struct Relay {
    endpoint: Arc<UnityEndpoint>,
    session: Arc<EditorSession>,
    server: McpServer,
    addr: SocketAddr,
}

impl Relay {
    /// Bind the Editor endpoint and build the MCP server
    pub async fn start(config: &RelayConfig) -> Result<Self> {
        config.validate()?;

        let state = BridgeState::new(config.log_capacity);
        let router = MessageRouter::new(
            state.clone(),
            config.package_filter().map(str::to_string),
        );
        let endpoint = UnityEndpoint::new(Arc::new(router));
        let addr = endpoint.start(config.socket_addr()?).await?;

        let session = Arc::new(EditorSession::new(
            endpoint.clone(),
            state,
            SessionSettings::from(config),
        ));

        let resources = ResourceCatalog::load(config.resources_dir.as_deref()).await;
        info!("{} MCP resource(s) available", resources.list().len());

        let server = McpServer::new(
            ToolHandler::new(session.clone()),
            resources,
            ConnectionRetry::from(config),
        );

        Ok(Self {
            endpoint,
            session,
            server,
            addr,
        })
    }

    /// Address the Editor endpoint is bound to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn session(&self) -> &Arc<EditorSession> {
        &self.session
    }

    pub fn server(&self) -> &McpServer {
        &self.server
    }

    /// Close the Editor connection and the listener
    pub async fn shutdown(&self) {
        self.endpoint.close().await;
    }
}
