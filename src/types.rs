//! Core data types for the Unity MCP relay
//!
//! This module defines the values that cross the WebSocket boundary: log
//! records streamed by the Editor, editor state snapshots, command results,
//! and the identifiers used to correlate requests with replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for an outbound correlated request
///
/// Wraps a UUID to provide type safety and prevent mixing request IDs
/// with other identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a request ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unity console log level (mirrors `UnityEngine.LogType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    /// Regular `Debug.Log` output
    Log,
    /// `Debug.LogWarning`
    Warning,
    /// `Debug.LogError`
    Error,
    /// Unhandled or logged exceptions
    Exception,
    /// Failed `Debug.Assert`
    Assert,
}

impl LogLevel {
    /// All levels, in Unity's order
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Log,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Exception,
        LogLevel::Assert,
    ];

    /// Wire name of the level
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "Log",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Exception => "Exception",
            LogLevel::Assert => "Assert",
        }
    }

    /// Parse a wire name (case-sensitive, as Unity sends them)
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == s)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log line captured in the Unity Editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Log message
    pub message: String,

    /// Stack trace attached by Unity (often empty for plain logs)
    #[serde(default)]
    pub stack_trace: String,

    /// Log level
    #[serde(rename = "logType")]
    pub level: LogLevel,

    /// When the Editor recorded the line
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Create a record stamped with the current time
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: String::new(),
            level,
            timestamp: Utc::now(),
        }
    }
}

/// Play mode reported in an editor snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayModeState {
    /// The Editor is in play mode
    Playing,
    /// The Editor is in edit mode
    Stopped,
    /// The Editor could not determine its state
    #[default]
    #[serde(other)]
    Unknown,
}

/// One GameObject in the scene hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    /// GameObject name
    pub name: String,

    /// Component type names
    #[serde(default)]
    pub components: Vec<String>,

    /// Child objects
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

/// Full snapshot of the Editor, produced on `getEditorState`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorStateSnapshot {
    /// Names of every GameObject found in loaded scenes
    pub active_game_objects: Vec<String>,

    /// Names of the current selection
    pub selected_objects: Vec<String>,

    /// Play mode
    pub play_mode_state: PlayModeState,

    /// Root objects of the active scene
    pub scene_hierarchy: Vec<SceneNode>,

    /// Asset paths grouped by category (`scenes`, `prefabs`, `scripts`, ...)
    pub project_structure: BTreeMap<String, Vec<String>>,
}

impl EditorStateSnapshot {
    /// Drop every project path that starts with `prefix`
    pub fn without_package_paths(mut self, prefix: &str) -> Self {
        for paths in self.project_structure.values_mut() {
            paths.retain(|path| !path.starts_with(prefix));
        }
        self
    }

    /// Script paths, or an empty list if the Editor reported none
    pub fn scripts(&self) -> &[String] {
        self.project_structure
            .get("scripts")
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The snapshot without the `scripts` category
    pub fn without_scripts(mut self) -> Self {
        self.project_structure.remove("scripts");
        self
    }
}

/// Failure details attached to an unsuccessful command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Exception message
    #[serde(default)]
    pub message: String,

    /// Exception stack trace
    #[serde(default)]
    pub stack_trace: String,

    /// Exception type name
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Reply to `executeEditorCommand`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Value returned by `EditorCommand.Execute`
    #[serde(default)]
    pub result: Value,

    /// Plain log lines captured during execution
    #[serde(default)]
    pub logs: Vec<String>,

    /// Error lines captured during execution
    #[serde(default)]
    pub errors: Vec<String>,

    /// Warning lines captured during execution
    #[serde(default)]
    pub warnings: Vec<String>,

    /// Whether the code compiled and ran
    pub execution_success: bool,

    /// Failure details (present when execution failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
}

impl CommandResult {
    /// Best available failure message
    pub fn failure_message(&self) -> String {
        match &self.error_details {
            Some(details) if !details.message.is_empty() => {
                if details.kind.is_empty() || details.message.contains(&details.kind) {
                    details.message.clone()
                } else {
                    format!("{}: {}", details.kind, details.message)
                }
            }
            _ if !self.errors.is_empty() => self.errors.join("\n"),
            _ => "Unity Editor reported an unknown failure".to_string(),
        }
    }

    /// Remote stack trace, if any
    pub fn stack_trace(&self) -> Option<String> {
        self.error_details
            .as_ref()
            .map(|details| details.stack_trace.clone())
            .filter(|trace| !trace.is_empty())
    }
}
