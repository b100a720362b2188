//! WebSocket endpoint the Unity Editor connects to
//!
//! The Unity plugin dials `ws://localhost:<port>` and reconnects on its own.
//! Only one Editor is tracked at a time: a new connection replaces the
//! previous one, which is sent a close frame.

use super::protocol::OutboundMessage;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Receives inbound traffic from the tracked Editor connection
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// A text frame arrived
    async fn on_message(&self, text: &str);

    /// The tracked connection closed
    async fn on_close(&self, connection_id: u64);

    /// The socket reported an error (a close follows)
    async fn on_error(&self, error: &str);
}

/// Outbound side of the Editor connection, as seen by the session
#[async_trait]
pub trait EditorLink: Send + Sync {
    /// Queue a request to the connected Editor
    async fn send(&self, message: OutboundMessage) -> Result<()>;

    /// Is an Editor connected right now?
    fn is_connected(&self) -> bool;

    /// Wait until an Editor is connected, up to `timeout`
    async fn wait_for_connection(&self, timeout: Duration) -> bool;
}

#[derive(Clone)]
struct PeerHandle {
    connection_id: u64,
    tx: mpsc::UnboundedSender<Message>,
}

/// Health document served on `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connected: bool,
}

#[derive(Clone)]
struct AppState {
    endpoint: Arc<UnityEndpoint>,
}

/// WebSocket listener plus the single tracked Editor peer
pub struct UnityEndpoint {
    handler: Arc<dyn FrameHandler>,
    peer: watch::Sender<Option<PeerHandle>>,
    next_connection_id: AtomicU64,
    shutdown: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl UnityEndpoint {
    /// Create an endpoint that reports inbound traffic to `handler`
    pub fn new(handler: Arc<dyn FrameHandler>) -> Arc<Self> {
        let (peer, _) = watch::channel(None);
        Arc::new(Self {
            handler,
            peer,
            next_connection_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            server: Mutex::new(None),
        })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and start serving; returns the bound address
    pub async fn start(self: &Arc<Self>, addr: SocketAddr) -> Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| {
                error!("Failed to bind Unity endpoint on {}: {}", addr, source);
                RelayError::Bind { addr, source }
            })?;
        let local_addr = listener.local_addr()?;

        let router = Self::build_router(AppState {
            endpoint: Arc::clone(self),
        });
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Unity endpoint server error: {}", e);
            }
        });
        *self.server.lock().await = Some(handle);

        info!("Waiting for Unity Editor on ws://{}", local_addr);
        Ok(local_addr)
    }

    /// Close the tracked peer and stop listening
    pub async fn close(&self) {
        let peer = self.peer.borrow().clone();
        if let Some(peer) = peer {
            let _ = peer.tx.send(Message::Close(None));
        }
        self.shutdown.cancel();

        if let Some(handle) = self.server.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!("Unity endpoint did not shut down within 5 seconds");
            }
        }
        info!("Unity endpoint closed");
    }

    /// Id of the tracked connection, if any
    pub fn connection_id(&self) -> Option<u64> {
        self.peer.borrow().as_ref().map(|peer| peer.connection_id)
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let previous = self.peer.send_replace(Some(PeerHandle { connection_id, tx }));
        if let Some(previous) = previous {
            info!(
                "Unity Editor connection {} replaced by {}",
                previous.connection_id, connection_id
            );
            let _ = previous.tx.send(Message::Close(None));
        }
        info!("Unity Editor connected (connection {})", connection_id);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!("Writer for connection {} stopped: {}", connection_id, e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received frame: {}", text);
                        self.handler.on_message(&text).await;
                    }
                    Some(Ok(Message::Binary(_))) => debug!("Ignoring binary frame"),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Unity Editor socket error: {}", e);
                        self.handler.on_error(&e.to_string()).await;
                        break;
                    }
                },
            }
        }

        let cleared = self.peer.send_if_modified(|slot| {
            if slot.as_ref().map(|peer| peer.connection_id) == Some(connection_id) {
                *slot = None;
                true
            } else {
                false
            }
        });

        if cleared {
            info!("Unity Editor disconnected (connection {})", connection_id);
            self.handler.on_close(connection_id).await;
        } else {
            debug!("Superseded connection {} closed", connection_id);
        }

        // Our sender is gone from the slot either way, so the writer drains and exits.
        if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
            debug!("Writer for connection {} did not finish in time", connection_id);
        }
    }
}

#[async_trait]
impl EditorLink for UnityEndpoint {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let frame = message.encode()?;
        let peer = self.peer.borrow().clone();

        match peer {
            Some(peer) => {
                debug!("Sending {} {}", message.kind(), message.id());
                peer.tx
                    .send(Message::Text(frame))
                    .map_err(|_| RelayError::NotConnected)
            }
            None => {
                warn!("Cannot send {}: Unity Editor is not connected", message.kind());
                Err(RelayError::NotConnected)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.peer.borrow().is_some()
    }

    async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let mut rx = self.peer.subscribe();
        let connected = async move {
            loop {
                if rx.borrow_and_update().is_some() {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, connected)
            .await
            .unwrap_or(false)
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| state.endpoint.handle_socket(socket))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected: state.endpoint.is_connected(),
    })
}
