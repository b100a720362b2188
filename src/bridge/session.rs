//! Editor session: the request/await side of the bridge
//!
//! Owns the shared log buffer and pending registry plus one FIFO gate per
//! exchange kind, so at most one command and one state query are in flight.

use super::endpoint::EditorLink;
use super::log_buffer::LogQuery;
use super::pending::{ExchangeKind, ExchangeReply, PendingReply};
use super::protocol::OutboundMessage;
use super::BridgeState;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::types::{EditorStateSnapshot, LogRecord, RequestId};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Reply bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub command_timeout: Duration,
    pub state_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(60),
            state_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&RelayConfig> for SessionSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            command_timeout: config.command_timeout(),
            state_timeout: config.state_timeout(),
        }
    }
}

/// Successful command execution
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Value returned by the command
    pub result: Value,
    /// Log records that arrived while the command ran
    pub logs: Vec<LogRecord>,
    /// Wall time from send to reply
    pub elapsed: Duration,
}

/// Explicit session state shared by every tool call
pub struct EditorSession {
    link: Arc<dyn EditorLink>,
    state: BridgeState,
    settings: SessionSettings,
    command_gate: Mutex<()>,
    state_gate: Mutex<()>,
}

impl EditorSession {
    pub fn new(link: Arc<dyn EditorLink>, state: BridgeState, settings: SessionSettings) -> Self {
        Self {
            link,
            state,
            settings,
            command_gate: Mutex::new(()),
            state_gate: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Wait up to `timeout` for the Editor to connect
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        self.link.wait_for_connection(timeout).await
    }

    /// Run a C# snippet in the Editor
    ///
    /// Calls queue behind each other; the next command is only sent once the
    /// previous one has settled.
    pub async fn execute_command(&self, code: &str) -> Result<CommandOutcome> {
        if code.trim().is_empty() {
            return Err(RelayError::validation("The code parameter cannot be empty"));
        }

        let _turn = self.command_gate.lock().await;
        if !self.link.is_connected() {
            return Err(RelayError::NotConnected);
        }

        let watermark = self.state.logs.read().await.watermark();
        let started = Instant::now();

        let (id, reply) = self.state.pending.register(ExchangeKind::Command).await;
        let message = OutboundMessage::ExecuteEditorCommand {
            id,
            code: code.to_string(),
        };
        let reply = self
            .request(ExchangeKind::Command, id, message, reply, self.settings.command_timeout)
            .await?;

        let result = match reply {
            ExchangeReply::Command(result) => result,
            ExchangeReply::State(_) => {
                return Err(RelayError::Protocol(
                    "editor state delivered to a command request".to_string(),
                ))
            }
        };

        let elapsed = started.elapsed();
        if !result.execution_success {
            let stack_trace = result.stack_trace();
            if let Some(trace) = &stack_trace {
                debug!("Remote stack trace for {}:\n{}", id, trace);
            }
            return Err(RelayError::RemoteExecution {
                message: result.failure_message(),
                stack_trace,
            });
        }

        let logs = self.state.logs.read().await.since(watermark);
        info!("Command {} completed in {}ms", id, elapsed.as_millis());

        Ok(CommandOutcome {
            result: result.result,
            logs,
            elapsed,
        })
    }

    /// Ask the Editor for a fresh snapshot
    pub async fn fetch_editor_state(&self) -> Result<EditorStateSnapshot> {
        let _turn = self.state_gate.lock().await;
        if !self.link.is_connected() {
            return Err(RelayError::NotConnected);
        }

        let (id, reply) = self.state.pending.register(ExchangeKind::State).await;
        let message = OutboundMessage::GetEditorState { id };
        let reply = self
            .request(ExchangeKind::State, id, message, reply, self.settings.state_timeout)
            .await?;

        match reply {
            ExchangeReply::State(snapshot) => Ok(snapshot),
            ExchangeReply::Command(_) => Err(RelayError::Protocol(
                "command result delivered to a state request".to_string(),
            )),
        }
    }

    /// Query buffered logs (never touches the network)
    pub async fn query_logs(&self, query: &LogQuery, limit: usize) -> Vec<LogRecord> {
        self.state.logs.read().await.filter(query, limit)
    }

    async fn request(
        &self,
        kind: ExchangeKind,
        id: RequestId,
        message: OutboundMessage,
        reply: PendingReply,
        bound: Duration,
    ) -> Result<ExchangeReply> {
        if let Err(e) = self.link.send(message).await {
            self.state.pending.cancel(kind, id).await;
            return Err(e);
        }

        match tokio::time::timeout(bound, reply).await {
            Ok(Ok(reply)) => reply,
            // Sender dropped without a reply
            Ok(Err(_)) => Err(RelayError::NotConnected),
            Err(_) => {
                self.state.pending.cancel(kind, id).await;
                warn!("{} exchange {} timed out after {:?}", kind, id, bound);
                Err(RelayError::Timeout {
                    operation: match kind {
                        ExchangeKind::Command => "Command execution".to_string(),
                        ExchangeKind::State => "Editor state request".to_string(),
                    },
                    seconds: whole_seconds(bound),
                })
            }
        }
    }
}

/// Bound in seconds, rounded up so a partial second is never reported as less
fn whole_seconds(bound: Duration) -> u64 {
    bound.as_millis().div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{MessageRouter, RouteOutcome};
    use crate::types::{LogLevel, PlayModeState};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records outbound messages instead of sending them
    struct MockLink {
        connected: AtomicBool,
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl MockLink {
        fn connected() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                sent: Mutex::new(Vec::new()),
            })
        }

        async fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl EditorLink for MockLink {
        async fn send(&self, message: OutboundMessage) -> Result<()> {
            if !self.is_connected() {
                return Err(RelayError::NotConnected);
            }
            self.sent.lock().await.push(message);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn wait_for_connection(&self, _timeout: Duration) -> bool {
            self.is_connected()
        }
    }

    struct Harness {
        link: Arc<MockLink>,
        router: MessageRouter,
        session: Arc<EditorSession>,
    }

    fn harness() -> Harness {
        let link = MockLink::connected();
        let state = BridgeState::new(100);
        let router = MessageRouter::new(state.clone(), Some("Packages/".to_string()));
        let session = Arc::new(EditorSession::new(
            link.clone(),
            state,
            SessionSettings::default(),
        ));
        Harness {
            link,
            router,
            session,
        }
    }

    /// Wait until the session has sent `count` messages
    async fn sent_after(link: &MockLink, count: usize) -> Vec<OutboundMessage> {
        loop {
            let sent = link.sent().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::task::yield_now().await;
        }
    }

    fn log_frame(message: &str) -> String {
        json!({
            "type": "log",
            "data": {"message": message, "stackTrace": "", "logType": "Log", "timestamp": "2024-01-14T12:00:00Z"}
        })
        .to_string()
    }

    fn result_frame(id: Option<RequestId>, data: Value) -> String {
        let mut frame = json!({"type": "commandResult", "data": data});
        if let Some(id) = id {
            frame["id"] = json!(id.to_string());
        }
        frame.to_string()
    }

    #[tokio::test]
    async fn test_execute_collects_logs_since_send() {
        let h = harness();
        h.router.route(&log_frame("before")).await;

        let session = h.session.clone();
        let call = tokio::spawn(async move { session.execute_command("return 1;").await });

        let sent = sent_after(&h.link, 1).await;
        let id = match &sent[0] {
            OutboundMessage::ExecuteEditorCommand { id, code } => {
                assert_eq!(code, "return 1;");
                *id
            }
            other => panic!("Expected execute command, got {:?}", other),
        };

        h.router.route(&log_frame("during")).await;
        let outcome = h
            .router
            .route(&result_frame(
                Some(id),
                json!({"result": {"moved": 3}, "executionSuccess": true}),
            ))
            .await;
        assert!(matches!(outcome, RouteOutcome::Resolved { .. }));

        let outcome = call.await.unwrap().unwrap();
        assert_eq!(outcome.result, json!({"moved": 3}));
        let messages: Vec<_> = outcome.logs.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["during"]);
    }

    #[tokio::test]
    async fn test_execute_returns_result_with_empty_window() {
        let h = harness();
        let session = h.session.clone();
        let call = tokio::spawn(async move { session.execute_command("return 1;").await });

        let sent = sent_after(&h.link, 1).await;
        h.router
            .route(&result_frame(
                Some(sent[0].id()),
                json!({"result": 1, "logs": [], "errors": [], "warnings": [], "executionSuccess": true}),
            ))
            .await;

        let outcome = call.await.unwrap().unwrap();
        assert_eq!(outcome.result, json!(1));
        assert!(outcome.logs.is_empty());
    }

    #[tokio::test]
    async fn test_empty_code_is_rejected_before_sending() {
        let h = harness();
        for code in ["", "   \n\t"] {
            match h.session.execute_command(code).await {
                Err(RelayError::Validation(_)) => {}
                other => panic!("Expected validation error, got {:?}", other),
            }
        }
        assert!(h.link.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_session_sends_nothing() {
        let h = harness();
        h.link.connected.store(false, Ordering::SeqCst);

        assert!(matches!(
            h.session.execute_command("x").await,
            Err(RelayError::NotConnected)
        ));
        assert!(matches!(
            h.session.fetch_editor_state().await,
            Err(RelayError::NotConnected)
        ));
        assert!(h.link.sent().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout_names_bound() {
        let h = harness();
        let started = Instant::now();

        match h.session.execute_command("while (true) {}").await {
            Err(RelayError::Timeout { seconds, .. }) => assert_eq!(seconds, 60),
            other => panic!("Expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(60_000));
        assert!(started.elapsed() < Duration::from_millis(60_050));

        // A late reply is dropped without effect
        let sent = h.link.sent().await;
        let outcome = h
            .router
            .route(&result_frame(
                Some(sent[0].id()),
                json!({"result": null, "executionSuccess": true}),
            ))
            .await;
        assert!(matches!(outcome, RouteOutcome::Orphaned { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_timeout_is_thirty_seconds() {
        let h = harness();
        let started = Instant::now();

        match h.session.fetch_editor_state().await {
            Err(RelayError::Timeout { seconds, .. }) => assert_eq!(seconds, 30),
            other => panic!("Expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_timeout_rounds_up() {
        let link = MockLink::connected();
        let session = EditorSession::new(
            link,
            BridgeState::new(10),
            SessionSettings {
                command_timeout: Duration::from_millis(1500),
                state_timeout: Duration::from_millis(200),
            },
        );

        match session.execute_command("x").await {
            Err(RelayError::Timeout { seconds, .. }) => assert_eq!(seconds, 2),
            other => panic!("Expected timeout, got {:?}", other),
        }
        match session.fetch_editor_state().await {
            Err(err @ RelayError::Timeout { .. }) => {
                assert!(err.to_string().contains("after 1 seconds"));
            }
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_failure_carries_message() {
        let h = harness();
        let session = h.session.clone();
        let call = tokio::spawn(async move { session.execute_command("bad").await });

        sent_after(&h.link, 1).await;
        h.router
            .route(&result_frame(
                None,
                json!({
                    "result": null,
                    "errors": ["error CS1002: ; expected"],
                    "executionSuccess": false,
                    "errorDetails": {"message": "CompileError: ; expected", "stackTrace": "", "type": "CompileError"}
                }),
            ))
            .await;

        match call.await.unwrap() {
            Err(RelayError::RemoteExecution {
                message,
                stack_trace,
            }) => {
                assert!(message.contains("CompileError"));
                assert!(stack_trace.is_none());
            }
            other => panic!("Expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_command_waits_for_first() {
        let h = harness();

        let first = {
            let session = h.session.clone();
            tokio::spawn(async move { session.execute_command("first").await })
        };
        sent_after(&h.link, 1).await;

        let second = {
            let session = h.session.clone();
            tokio::spawn(async move { session.execute_command("second").await })
        };
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.link.sent().await.len(), 1, "second command sent too early");

        // Legacy reply without id goes to the only outstanding waiter
        h.router
            .route(&result_frame(None, json!({"result": "one", "executionSuccess": true})))
            .await;
        assert_eq!(first.await.unwrap().unwrap().result, json!("one"));

        let sent = sent_after(&h.link, 2).await;
        h.router
            .route(&result_frame(
                Some(sent[1].id()),
                json!({"result": "two", "executionSuccess": true}),
            ))
            .await;
        assert_eq!(second.await.unwrap().unwrap().result, json!("two"));
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_exchange_pending() {
        let h = harness();
        let session = h.session.clone();
        let call = tokio::spawn(async move { session.fetch_editor_state().await });

        let sent = sent_after(&h.link, 1).await;
        assert!(matches!(h.router.route("{not json").await, RouteOutcome::Malformed(_)));
        h.router.route("{\"type\":\"editorState\",\"data\":[1,2]}").await;
        h.router
            .route(
                &json!({
                    "type": "editorState",
                    "id": sent[0].id().to_string(),
                    "data": {"playModeState": "Playing", "activeGameObjects": ["Cube"]}
                })
                .to_string(),
            )
            .await;

        let snapshot = call.await.unwrap().unwrap();
        assert_eq!(snapshot.play_mode_state, PlayModeState::Playing);
        assert_eq!(snapshot.active_game_objects, vec!["Cube"]);
    }

    #[tokio::test]
    async fn test_disconnect_fails_in_flight_command() {
        use crate::bridge::FrameHandler;

        let h = harness();
        let session = h.session.clone();
        let call = tokio::spawn(async move { session.execute_command("x").await });

        sent_after(&h.link, 1).await;
        h.router.on_close(1).await;

        assert!(matches!(call.await.unwrap(), Err(RelayError::NotConnected)));
    }

    #[tokio::test]
    async fn test_query_logs_is_local() {
        let h = harness();
        h.link.connected.store(false, Ordering::SeqCst);
        h.router.route(&log_frame("one")).await;
        h.router.route(&log_frame("two")).await;

        let query = LogQuery {
            levels: Some([LogLevel::Log].into_iter().collect()),
            ..Default::default()
        };
        let logs = h.session.query_logs(&query, 1).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "two");
    }
}
