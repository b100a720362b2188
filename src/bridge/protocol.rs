//! Wire protocol spoken with the Unity Editor
//!
//! Every WebSocket text frame carries one JSON envelope:
//! `{"type": <string>, "data": <any>, "id"?: <string>}`.
//! Inbound frames are decoded into [`InboundMessage`] before anything else
//! touches them.

use crate::error::{RelayError, Result};
use crate::types::{CommandResult, EditorStateSnapshot, LogRecord, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Inbound `type` tags
pub const COMMAND_RESULT: &str = "commandResult";
pub const EDITOR_STATE: &str = "editorState";
pub const LOG: &str = "log";

/// Outbound `type` tags
pub const EXECUTE_EDITOR_COMMAND: &str = "executeEditorCommand";
pub const GET_EDITOR_STATE: &str = "getEditorState";

/// Raw frame envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// Message type tag
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific payload
    #[serde(default)]
    pub data: Value,

    /// Correlation id (outbound requests always carry one, replies may echo it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Reply to `executeEditorCommand`
    CommandResult {
        id: Option<RequestId>,
        result: CommandResult,
    },
    /// Reply to `getEditorState`
    EditorState {
        id: Option<RequestId>,
        snapshot: EditorStateSnapshot,
    },
    /// Streamed console log line
    Log(LogRecord),
    /// A type tag we do not handle
    Unknown { kind: String },
}

impl InboundMessage {
    /// Decode a text frame
    ///
    /// Fails with [`RelayError::Protocol`] on malformed JSON, a malformed
    /// correlation id, or a known type whose `data` has the wrong shape.
    pub fn decode(text: &str) -> Result<Self> {
        let envelope: WireEnvelope = serde_json::from_str(text)
            .map_err(|e| RelayError::Protocol(format!("invalid frame: {}", e)))?;

        let id = match envelope.id.as_deref() {
            Some(raw) => Some(RequestId::from_string(raw).map_err(|e| {
                RelayError::Protocol(format!("invalid request id '{}': {}", raw, e))
            })?),
            None => None,
        };

        let message = match envelope.kind.as_str() {
            COMMAND_RESULT => InboundMessage::CommandResult {
                id,
                result: decode_data(&envelope.kind, envelope.data)?,
            },
            EDITOR_STATE => InboundMessage::EditorState {
                id,
                snapshot: decode_data(&envelope.kind, envelope.data)?,
            },
            LOG => InboundMessage::Log(decode_data(&envelope.kind, envelope.data)?),
            _ => InboundMessage::Unknown {
                kind: envelope.kind,
            },
        };

        Ok(message)
    }
}

fn decode_data<T: serde::de::DeserializeOwned>(kind: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| RelayError::Protocol(format!("malformed '{}' payload: {}", kind, e)))
}

/// Outbound request to the Editor
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Compile and run a C# `EditorCommand` class
    ExecuteEditorCommand { id: RequestId, code: String },
    /// Ask for a fresh editor snapshot
    GetEditorState { id: RequestId },
}

impl OutboundMessage {
    /// Correlation id carried by this request
    pub fn id(&self) -> RequestId {
        match self {
            OutboundMessage::ExecuteEditorCommand { id, .. } => *id,
            OutboundMessage::GetEditorState { id } => *id,
        }
    }

    /// Wire type tag
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::ExecuteEditorCommand { .. } => EXECUTE_EDITOR_COMMAND,
            OutboundMessage::GetEditorState { .. } => GET_EDITOR_STATE,
        }
    }

    /// Build the wire envelope
    pub fn to_envelope(&self) -> WireEnvelope {
        let data = match self {
            OutboundMessage::ExecuteEditorCommand { code, .. } => json!({ "code": code }),
            OutboundMessage::GetEditorState { .. } => json!({}),
        };

        WireEnvelope {
            kind: self.kind().to_string(),
            data,
            id: Some(self.id().to_string()),
        }
    }

    /// Serialize to a text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_envelope())?)
    }
}
