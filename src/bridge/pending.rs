//! Registry of outstanding correlated requests
//!
//! Each outbound `executeEditorCommand` / `getEditorState` registers a waiter
//! here. The waiter is consumed exactly once: by a matching reply, by its
//! caller cancelling after a timeout, or by [`PendingRegistry::fail_all`] when
//! the Editor disconnects.

use crate::error::{RelayError, Result};
use crate::types::{CommandResult, EditorStateSnapshot, RequestId};
use std::collections::VecDeque;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Kind of correlated exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Command,
    State,
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeKind::Command => write!(f, "command"),
            ExchangeKind::State => write!(f, "state"),
        }
    }
}

/// Typed reply delivered to a waiter
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeReply {
    Command(CommandResult),
    State(EditorStateSnapshot),
}

impl ExchangeReply {
    pub fn kind(&self) -> ExchangeKind {
        match self {
            ExchangeReply::Command(_) => ExchangeKind::Command,
            ExchangeReply::State(_) => ExchangeKind::State,
        }
    }
}

/// Receiving half handed back by [`PendingRegistry::register`]
pub type PendingReply = oneshot::Receiver<Result<ExchangeReply>>;

struct Waiter {
    kind: ExchangeKind,
    id: RequestId,
    started: Instant,
    tx: oneshot::Sender<Result<ExchangeReply>>,
}

/// Outstanding waiters, kept in registration order
#[derive(Default)]
pub struct PendingRegistry {
    waiters: Mutex<VecDeque<Waiter>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh request id and a receiver for its reply
    pub async fn register(&self, kind: ExchangeKind) -> (RequestId, PendingReply) {
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();

        self.waiters.lock().await.push_back(Waiter {
            kind,
            id,
            started: Instant::now(),
            tx,
        });

        debug!("Registered {} exchange {}", kind, id);
        (id, rx)
    }

    /// Deliver a reply
    ///
    /// With an id, only that waiter is resolved. Without one, the oldest
    /// waiter of the reply's kind is. Returns whether a waiter was found.
    pub async fn resolve(&self, id: Option<RequestId>, reply: ExchangeReply) -> bool {
        let kind = reply.kind();
        let waiter = {
            let mut waiters = self.waiters.lock().await;
            let position = match id {
                Some(id) => waiters.iter().position(|w| w.kind == kind && w.id == id),
                None => waiters.iter().position(|w| w.kind == kind),
            };
            position.and_then(|index| waiters.remove(index))
        };

        match waiter {
            Some(waiter) => {
                debug!(
                    "Resolved {} exchange {} after {:?}",
                    kind,
                    waiter.id,
                    waiter.started.elapsed()
                );
                // The caller may have dropped its receiver already; nothing to do then.
                let _ = waiter.tx.send(Ok(reply));
                true
            }
            None => {
                match id {
                    Some(id) => warn!("Dropping late or orphaned {} reply {}", kind, id),
                    // The plugin pushes editorState on its own every second
                    None => debug!("Dropping uncorrelated {} reply with no waiter", kind),
                }
                false
            }
        }
    }

    /// Forget a waiter whose caller gave up
    pub async fn cancel(&self, kind: ExchangeKind, id: RequestId) -> bool {
        let mut waiters = self.waiters.lock().await;
        match waiters.iter().position(|w| w.kind == kind && w.id == id) {
            Some(index) => {
                waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Reject every outstanding waiter, returning how many there were
    pub async fn fail_all(&self, make_error: impl Fn() -> RelayError) -> usize {
        let drained: Vec<Waiter> = self.waiters.lock().await.drain(..).collect();
        let count = drained.len();
        for waiter in drained {
            let _ = waiter.tx.send(Err(make_error()));
        }
        if count > 0 {
            warn!("Failed {} pending exchange(s)", count);
        }
        count
    }

    /// Number of outstanding waiters of `kind`
    pub async fn outstanding(&self, kind: ExchangeKind) -> usize {
        self.waiters
            .lock()
            .await
            .iter()
            .filter(|w| w.kind == kind)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command_reply(value: serde_json::Value) -> ExchangeReply {
        ExchangeReply::Command(CommandResult {
            result: value,
            logs: vec![],
            errors: vec![],
            warnings: vec![],
            execution_success: true,
            error_details: None,
        })
    }

    #[tokio::test]
    async fn test_resolve_by_id() {
        let registry = PendingRegistry::new();
        let (first, first_rx) = registry.register(ExchangeKind::Command).await;
        let (second, second_rx) = registry.register(ExchangeKind::Command).await;
        assert_ne!(first, second);

        assert!(registry.resolve(Some(second), command_reply(json!(2))).await);
        assert!(registry.resolve(Some(first), command_reply(json!(1))).await);

        assert_eq!(first_rx.await.unwrap().unwrap(), command_reply(json!(1)));
        assert_eq!(second_rx.await.unwrap().unwrap(), command_reply(json!(2)));
    }

    #[tokio::test]
    async fn test_resolve_without_id_picks_oldest_of_kind() {
        let registry = PendingRegistry::new();
        let (_, state_rx) = registry.register(ExchangeKind::State).await;
        let (_, oldest_rx) = registry.register(ExchangeKind::Command).await;
        let (_, newest_rx) = registry.register(ExchangeKind::Command).await;

        assert!(registry.resolve(None, command_reply(json!("a"))).await);

        assert_eq!(oldest_rx.await.unwrap().unwrap(), command_reply(json!("a")));
        assert_eq!(registry.outstanding(ExchangeKind::Command).await, 1);
        assert_eq!(registry.outstanding(ExchangeKind::State).await, 1);
        drop(newest_rx);
        drop(state_rx);
    }

    #[tokio::test]
    async fn test_reply_kind_must_match() {
        let registry = PendingRegistry::new();
        let (id, _rx) = registry.register(ExchangeKind::State).await;

        assert!(!registry.resolve(Some(id), command_reply(json!(null))).await);
        assert_eq!(registry.outstanding(ExchangeKind::State).await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_ignores_late_reply() {
        let registry = PendingRegistry::new();
        let (id, _rx) = registry.register(ExchangeKind::Command).await;

        assert!(registry.cancel(ExchangeKind::Command, id).await);
        assert!(!registry.cancel(ExchangeKind::Command, id).await);
        assert!(!registry.resolve(Some(id), command_reply(json!(1))).await);
    }

    #[tokio::test]
    async fn test_unsolicited_state_pushes_are_dropped() {
        let registry = PendingRegistry::new();
        let (_id, rx) = registry.register(ExchangeKind::Command).await;

        for _ in 0..3 {
            let push = ExchangeReply::State(EditorStateSnapshot::default());
            assert!(!registry.resolve(None, push).await);
        }

        assert_eq!(registry.outstanding(ExchangeKind::State).await, 0);
        assert_eq!(registry.outstanding(ExchangeKind::Command).await, 1);
        drop(rx);
    }

    #[tokio::test]
    async fn test_fail_all_rejects_every_waiter() {
        let registry = PendingRegistry::new();
        let (_, command_rx) = registry.register(ExchangeKind::Command).await;
        let (_, state_rx) = registry.register(ExchangeKind::State).await;

        assert_eq!(registry.fail_all(|| RelayError::NotConnected).await, 2);

        assert!(matches!(command_rx.await.unwrap(), Err(RelayError::NotConnected)));
        assert!(matches!(state_rx.await.unwrap(), Err(RelayError::NotConnected)));
        assert_eq!(registry.fail_all(|| RelayError::NotConnected).await, 0);
    }
}
