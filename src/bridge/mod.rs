//! WebSocket bridge to the Unity Editor
//!
//! The Editor connects to [`UnityEndpoint`] as a WebSocket client. Inbound
//! frames go through the [`MessageRouter`] into the [`LogBuffer`] or the
//! [`PendingRegistry`]; [`EditorSession`] drives the outbound side and awaits
//! correlated replies.

pub mod endpoint;
pub mod log_buffer;
pub mod pending;
pub mod protocol;
pub mod router;
pub mod session;

pub use endpoint::{EditorLink, FrameHandler, UnityEndpoint};
pub use log_buffer::{LogBuffer, LogQuery};
pub use pending::{ExchangeKind, ExchangeReply, PendingRegistry};
pub use protocol::{InboundMessage, OutboundMessage, WireEnvelope};
pub use router::{MessageRouter, RouteOutcome};
pub use session::{CommandOutcome, EditorSession, SessionSettings};

use std::sync::Arc;
use tokio::sync::RwLock;

/// State shared between the inbound router and the session
#[derive(Clone)]
pub struct BridgeState {
    /// Log ring buffer fed by `log` frames
    pub logs: Arc<RwLock<LogBuffer>>,
    /// Outstanding correlated requests
    pub pending: Arc<PendingRegistry>,
}

impl BridgeState {
    /// Create shared state with a log buffer of the given capacity
    pub fn new(log_capacity: usize) -> Self {
        Self {
            logs: Arc::new(RwLock::new(LogBuffer::new(log_capacity))),
            pending: Arc::new(PendingRegistry::new()),
        }
    }
}
