//! Dispatch of decoded inbound frames

use super::endpoint::FrameHandler;
use super::pending::{ExchangeKind, ExchangeReply};
use super::protocol::InboundMessage;
use super::BridgeState;
use crate::error::RelayError;
use crate::types::RequestId;
use async_trait::async_trait;
use tracing::{debug, error, warn};

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A log record was appended
    LogAppended,
    /// A pending exchange was resolved
    Resolved {
        kind: ExchangeKind,
        id: Option<RequestId>,
    },
    /// A reply arrived with nobody waiting for it
    Orphaned {
        kind: ExchangeKind,
        id: Option<RequestId>,
    },
    /// Unhandled `type` tag
    Unknown(String),
    /// The frame could not be decoded
    Malformed(String),
}

/// Routes Editor frames into the log buffer and the pending registry
pub struct MessageRouter {
    state: BridgeState,
    package_filter: Option<String>,
}

impl MessageRouter {
    /// Create a router; snapshot paths under `package_filter` are dropped
    pub fn new(state: BridgeState, package_filter: Option<String>) -> Self {
        Self {
            state,
            package_filter,
        }
    }

    /// Decode and dispatch a single text frame
    pub async fn route(&self, text: &str) -> RouteOutcome {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed frame from Unity Editor: {}", e);
                return RouteOutcome::Malformed(e.to_string());
            }
        };

        match message {
            InboundMessage::Log(record) => {
                self.state.logs.write().await.append(record);
                RouteOutcome::LogAppended
            }
            InboundMessage::CommandResult { id, result } => {
                self.deliver(id, ExchangeReply::Command(result)).await
            }
            InboundMessage::EditorState { id, snapshot } => {
                let snapshot = match &self.package_filter {
                    Some(prefix) => snapshot.without_package_paths(prefix),
                    None => snapshot,
                };
                self.deliver(id, ExchangeReply::State(snapshot)).await
            }
            InboundMessage::Unknown { kind } => {
                warn!("Ignoring unknown message type from Unity Editor: {}", kind);
                RouteOutcome::Unknown(kind)
            }
        }
    }

    async fn deliver(&self, id: Option<RequestId>, reply: ExchangeReply) -> RouteOutcome {
        let kind = reply.kind();
        if self.state.pending.resolve(id, reply).await {
            RouteOutcome::Resolved { kind, id }
        } else {
            RouteOutcome::Orphaned { kind, id }
        }
    }
}

#[async_trait]
impl FrameHandler for MessageRouter {
    async fn on_message(&self, text: &str) {
        let outcome = self.route(text).await;
        debug!("Routed frame: {:?}", outcome);
    }

    async fn on_close(&self, connection_id: u64) {
        let failed = self
            .state
            .pending
            .fail_all(|| RelayError::NotConnected)
            .await;
        if failed > 0 {
            warn!(
                "Connection {} closed with {} request(s) in flight",
                connection_id, failed
            );
        }
    }

    async fn on_error(&self, error: &str) {
        error!("Unity Editor connection error: {}", error);
    }
}
