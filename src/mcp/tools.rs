//! MCP tool implementations
//!
//! Three tools are exposed:
//! - `execute_editor_command`: compile and run C# inside the Editor
//! - `get_editor_state`: snapshot of scenes, selection and project assets
//! - `get_logs`: filtered view of the Editor console stream

use crate::bridge::{EditorSession, LogQuery};
use crate::error::{RelayError, Result};
use crate::types::{LogLevel, LogRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Maximum `count` accepted by `get_logs`
pub const MAX_LOG_COUNT: u64 = 1000;

/// Default `count` for `get_logs`
pub const DEFAULT_LOG_COUNT: u64 = 100;

/// Projectable log record fields
pub const LOG_FIELDS: [&str; 4] = ["message", "stackTrace", "logType", "timestamp"];

/// `get_editor_state` formats
pub const STATE_FORMATS: [&str; 3] = ["Raw", "scripts only", "no scripts"];

const NULL_REFERENCE_HINT: &str =
    "The code attempted to access a null object. Please check that all GameObject references exist.";
const COMPILE_ERROR_HINT: &str = "C# compilation error. Please check the syntax of your code.";
const COMMAND_FAILURE_PREFIX: &str = "Failed to execute command: ";

/// Tool schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name (e.g., "get_logs")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// Worked examples shown to the agent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<ToolExample>,
}

/// Example invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExample {
    pub description: String,
    pub input: Value,
    pub output: String,
}

/// The fixed set of tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ExecuteEditorCommand,
    GetEditorState,
    GetLogs,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::ExecuteEditorCommand,
        ToolName::GetEditorState,
        ToolName::GetLogs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ExecuteEditorCommand => "execute_editor_command",
            ToolName::GetEditorState => "get_editor_state",
            ToolName::GetLogs => "get_logs",
        }
    }

    /// Exact-match lookup
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Names of every tool
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(ToolName::as_str).collect()
    }

    /// Does this tool round-trip to the Editor?
    pub fn requires_editor(&self) -> bool {
        !matches!(self, ToolName::GetLogs)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool handler that dispatches to the session
pub struct ToolHandler {
    session: Arc<EditorSession>,
}

impl ToolHandler {
    pub fn new(session: Arc<EditorSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<EditorSession> {
        &self.session
    }

    /// Get list of all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: ToolName::ExecuteEditorCommand.to_string(),
                description: "Execute arbitrary C# code within the Unity Editor context. This allows direct manipulation of the Unity Editor, GameObjects, components, and project assets using the Unity Editor API.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "code": {
                            "type": "string",
                            "description": "C# code to execute in the Unity Editor context. The code has access to all UnityEditor and UnityEngine APIs. Include any necessary using directives at the top. The code must define an EditorCommand class with a static Execute method that returns an object.",
                            "minLength": 1
                        }
                    },
                    "required": ["code"],
                    "additionalProperties": false
                }),
                examples: vec![ToolExample {
                    description: "Center the selected object".to_string(),
                    input: json!({
                        "code": "using UnityEngine;\nusing UnityEditor;\n\npublic class EditorCommand\n{\n    public static object Execute()\n    {\n        Selection.activeGameObject.transform.position = Vector3.zero;\n        return \"Success\";\n    }\n}"
                    }),
                    output: r#"{ "result": "Success", "logs": [], "executionTime": "112ms", "status": "success" }"#.to_string(),
                }],
            },
            Tool {
                name: ToolName::GetEditorState.to_string(),
                description: "Retrieve the current state of the Unity Editor, including active GameObjects, selection state, play mode status, scene hierarchy, and project structure.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "format": {
                            "type": "string",
                            "enum": STATE_FORMATS,
                            "description": "Output format:\n- Raw: complete editor state\n- scripts only: only the list of script files in the project\n- no scripts: everything except script files",
                            "default": "Raw"
                        }
                    },
                    "additionalProperties": false
                }),
                examples: vec![
                    ToolExample {
                        description: "Get complete editor state".to_string(),
                        input: json!({}),
                        output: r#"{ "activeGameObjects": ["Main Camera", "Directional Light"], ... }"#.to_string(),
                    },
                    ToolExample {
                        description: "Get only script files".to_string(),
                        input: json!({"format": "scripts only"}),
                        output: r#"["Assets/Scripts/Player.cs", "Assets/Scripts/Enemy.cs"]"#.to_string(),
                    },
                ],
            },
            Tool {
                name: ToolName::GetLogs.to_string(),
                description: "Retrieve and filter Unity Editor logs: console messages, warnings, errors, exceptions and assertions.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "types": {
                            "type": "array",
                            "items": {
                                "type": "string",
                                "enum": LogLevel::ALL.iter().map(LogLevel::as_str).collect::<Vec<_>>()
                            },
                            "description": "Log types to include. All types when omitted."
                        },
                        "count": {
                            "type": "number",
                            "description": "Maximum number of log entries to return (most recent)",
                            "minimum": 1,
                            "maximum": MAX_LOG_COUNT,
                            "default": DEFAULT_LOG_COUNT
                        },
                        "fields": {
                            "type": "array",
                            "items": {"type": "string", "enum": LOG_FIELDS},
                            "description": "Fields to include in each entry. All fields when omitted."
                        },
                        "messageContains": {
                            "type": "string",
                            "description": "Only entries whose message contains this string (case-sensitive)",
                            "minLength": 1
                        },
                        "stackTraceContains": {
                            "type": "string",
                            "description": "Only entries whose stack trace contains this string (case-sensitive)",
                            "minLength": 1
                        },
                        "timestampAfter": {
                            "type": "string",
                            "format": "date-time",
                            "description": "Only entries at or after this ISO timestamp"
                        },
                        "timestampBefore": {
                            "type": "string",
                            "format": "date-time",
                            "description": "Only entries at or before this ISO timestamp"
                        }
                    },
                    "additionalProperties": false
                }),
                examples: vec![
                    ToolExample {
                        description: "Get recent error logs".to_string(),
                        input: json!({"types": ["Error", "Exception"], "count": 10, "fields": ["message", "timestamp"]}),
                        output: r#"[{"message": "NullReferenceException", "timestamp": "2024-01-14T12:00:00Z"}, ...]"#.to_string(),
                    },
                    ToolExample {
                        description: "Search logs for a specific message".to_string(),
                        input: json!({"messageContains": "Player", "fields": ["message", "logType"]}),
                        output: r#"[{"message": "Player position updated", "logType": "Log"}, ...]"#.to_string(),
                    },
                ],
            },
        ]
    }

    /// Validate and run a tool call
    pub async fn execute(&self, tool: ToolName, params: Value) -> Result<Value> {
        let call = ToolCall::parse(tool, params)?;
        self.run(call).await
    }

    /// Run an already validated call
    pub async fn run(&self, call: ToolCall) -> Result<Value> {
        debug!("Executing tool: {}", call.tool());

        match call {
            ToolCall::ExecuteEditorCommand { code } => self.execute_editor_command(&code).await,
            ToolCall::GetEditorState { format } => self.get_editor_state(format).await,
            ToolCall::GetLogs {
                query,
                count,
                fields,
            } => {
                let records = self.session.query_logs(&query, count).await;
                project_fields(&records, fields.as_deref())
            }
        }
    }

    async fn execute_editor_command(&self, code: &str) -> Result<Value> {
        let outcome = self
            .session
            .execute_command(code)
            .await
            .map_err(classify_command_error)?;

        Ok(json!({
            "result": outcome.result,
            "logs": outcome.logs,
            "executionTime": format!("{}ms", outcome.elapsed.as_millis()),
            "status": "success"
        }))
    }

    async fn get_editor_state(&self, format: StateFormat) -> Result<Value> {
        let snapshot = self.session.fetch_editor_state().await?;

        let value = match format {
            StateFormat::ScriptsOnly => serde_json::to_value(snapshot.scripts())?,
            StateFormat::NoScripts => serde_json::to_value(snapshot.without_scripts())?,
            StateFormat::Raw => serde_json::to_value(&snapshot)?,
        };
        Ok(value)
    }
}

/// Shape of the `get_editor_state` result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFormat {
    Raw,
    ScriptsOnly,
    NoScripts,
}

impl StateFormat {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "Raw" => Some(StateFormat::Raw),
            "scripts only" => Some(StateFormat::ScriptsOnly),
            "no scripts" => Some(StateFormat::NoScripts),
            _ => None,
        }
    }
}

/// Tool arguments after validation
///
/// Parsing never touches the Editor, so bad arguments are rejected before
/// any connection wait.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ExecuteEditorCommand {
        code: String,
    },
    GetEditorState {
        format: StateFormat,
    },
    GetLogs {
        query: LogQuery,
        count: usize,
        fields: Option<Vec<String>>,
    },
}

impl ToolCall {
    /// Validate raw arguments for `tool`
    pub fn parse(tool: ToolName, params: Value) -> Result<Self> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => params,
            _ => return Err(RelayError::validation("Tool arguments must be an object")),
        };

        match tool {
            ToolName::ExecuteEditorCommand => parse_execute(params),
            ToolName::GetEditorState => parse_editor_state(params),
            ToolName::GetLogs => parse_logs(params),
        }
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolCall::ExecuteEditorCommand { .. } => ToolName::ExecuteEditorCommand,
            ToolCall::GetEditorState { .. } => ToolName::GetEditorState,
            ToolCall::GetLogs { .. } => ToolName::GetLogs,
        }
    }
}

fn parse_execute(params: Value) -> Result<ToolCall> {
    let code = match params.get("code") {
        None | Some(Value::Null) => {
            return Err(RelayError::validation("The code parameter is required"))
        }
        Some(Value::String(code)) => code,
        Some(_) => return Err(RelayError::validation("The code parameter must be a string")),
    };
    if code.trim().is_empty() {
        return Err(RelayError::validation("The code parameter cannot be empty"));
    }

    Ok(ToolCall::ExecuteEditorCommand { code: code.clone() })
}

fn parse_editor_state(params: Value) -> Result<ToolCall> {
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct StateParams {
        format: Option<String>,
    }

    let params: StateParams = parse_params(params)?;
    let name = params.format.unwrap_or_else(|| "Raw".to_string());
    let format = StateFormat::parse(&name).ok_or_else(|| {
        RelayError::validation(format!(
            "Invalid format: \"{}\". Valid formats are: {}",
            name,
            STATE_FORMATS.join(", ")
        ))
    })?;

    Ok(ToolCall::GetEditorState { format })
}

fn parse_logs(params: Value) -> Result<ToolCall> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct LogsParams {
        types: Option<Vec<String>>,
        count: Option<u64>,
        fields: Option<Vec<String>>,
        message_contains: Option<String>,
        stack_trace_contains: Option<String>,
        timestamp_after: Option<String>,
        timestamp_before: Option<String>,
    }

    let params: LogsParams = parse_params(params)?;

    let count = params.count.unwrap_or(DEFAULT_LOG_COUNT);
    if !(1..=MAX_LOG_COUNT).contains(&count) {
        return Err(RelayError::validation(format!(
            "count must be between 1 and {}",
            MAX_LOG_COUNT
        )));
    }

    let levels = match params.types {
        Some(types) => Some(
            types
                .iter()
                .map(|name| {
                    LogLevel::parse(name).ok_or_else(|| {
                        RelayError::validation(format!(
                            "Invalid log type: \"{}\". Valid types are: {}",
                            name,
                            LogLevel::ALL.map(|l| l.as_str()).join(", ")
                        ))
                    })
                })
                .collect::<Result<_>>()?,
        ),
        None => None,
    };

    if let Some(fields) = &params.fields {
        if let Some(unknown) = fields.iter().find(|f| !LOG_FIELDS.contains(&f.as_str())) {
            return Err(RelayError::validation(format!(
                "Invalid field: \"{}\". Valid fields are: {}",
                unknown,
                LOG_FIELDS.join(", ")
            )));
        }
    }

    let query = LogQuery {
        levels,
        message_contains: params.message_contains.filter(|s| !s.is_empty()),
        stack_trace_contains: params.stack_trace_contains.filter(|s| !s.is_empty()),
        after: parse_timestamp("timestampAfter", params.timestamp_after)?,
        before: parse_timestamp("timestampBefore", params.timestamp_before)?,
    };

    Ok(ToolCall::GetLogs {
        query,
        count: count as usize,
        fields: params.fields,
    })
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| RelayError::validation(format!("Invalid arguments: {}", e)))
}

fn parse_timestamp(field: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| {
                    RelayError::validation(format!(
                        "{} must be an ISO 8601 timestamp, got \"{}\": {}",
                        field, raw, e
                    ))
                })
        })
        .transpose()
}

fn project_fields(records: &[LogRecord], fields: Option<&[String]>) -> Result<Value> {
    let fields = match fields {
        Some(fields) if !fields.is_empty() => fields,
        _ => return Ok(serde_json::to_value(records)?),
    };

    let projected = records
        .iter()
        .map(|record| {
            let full = serde_json::to_value(record)?;
            let mut selected = Map::new();
            for field in fields {
                if let Some(value) = full.get(field.as_str()) {
                    selected.insert(field.clone(), value.clone());
                }
            }
            Ok(Value::Object(selected))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Value::Array(projected))
}

/// Turn well-known remote failures into actionable caller errors
fn classify_command_error(err: RelayError) -> RelayError {
    match err {
        RelayError::RemoteExecution {
            message,
            stack_trace,
        } => {
            if message.contains("NullReferenceException") {
                RelayError::validation(NULL_REFERENCE_HINT)
            } else if message.contains("CompileError") {
                RelayError::validation(COMPILE_ERROR_HINT)
            } else {
                let message = if message.starts_with(COMMAND_FAILURE_PREFIX) {
                    message
                } else {
                    format!("{}{}", COMMAND_FAILURE_PREFIX, message)
                };
                RelayError::RemoteExecution {
                    message,
                    stack_trace,
                }
            }
        }
        other => other,
    }
}
