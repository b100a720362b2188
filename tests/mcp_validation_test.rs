//! Integration tests for MCP parameter validation
//!
//! Verifies that tools reject invalid arguments before anything is sent to the
//! Unity Editor. No Editor is connected here, so any call that got past
//! validation would fail with `NotConnected` instead.

use serde_json::json;
use std::sync::Arc;
use unity_mcp_relay::bridge::{BridgeState, MessageRouter, SessionSettings};
use unity_mcp_relay::mcp::{ToolHandler, ToolName};
use unity_mcp_relay::{EditorSession, RelayError, UnityEndpoint};

fn create_test_handler() -> ToolHandler {
    let state = BridgeState::new(100);
    let router = MessageRouter::new(state.clone(), Some("Packages/".to_string()));
    let endpoint = UnityEndpoint::new(Arc::new(router));
    let session = EditorSession::new(endpoint, state, SessionSettings::default());
    ToolHandler::new(Arc::new(session))
}

#[tokio::test]
async fn test_execute_missing_code() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::ExecuteEditorCommand, json!({}))
        .await;

    match result {
        Err(RelayError::Validation(msg)) => {
            assert!(msg.contains("code"), "Error should mention code field");
            assert!(msg.contains("required"), "Error should mention required");
        }
        _ => panic!("Expected Validation for missing code, got: {:?}", result),
    }
}

#[tokio::test]
async fn test_execute_non_string_code() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::ExecuteEditorCommand, json!({"code": 42}))
        .await;

    match result {
        Err(RelayError::Validation(msg)) => {
            assert!(msg.contains("must be a string"));
        }
        _ => panic!("Expected Validation for numeric code, got: {:?}", result),
    }
}

#[tokio::test]
async fn test_execute_whitespace_only_code() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::ExecuteEditorCommand, json!({"code": "  \n\t "}))
        .await;

    match result {
        Err(RelayError::Validation(msg)) => {
            assert!(msg.contains("cannot be empty"));
        }
        _ => panic!("Expected Validation for whitespace code"),
    }
}

#[tokio::test]
async fn test_execute_valid_code_reaches_connection_check() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::ExecuteEditorCommand, json!({"code": "return 1;"}))
        .await;

    assert!(matches!(result, Err(RelayError::NotConnected)));
}

#[tokio::test]
async fn test_arguments_must_be_object() {
    let handler = create_test_handler();

    for tool in ToolName::ALL {
        let result = handler.execute(tool, json!(["code"])).await;
        assert!(
            matches!(result, Err(RelayError::Validation(_))),
            "{} accepted array arguments",
            tool
        );
    }
}

#[tokio::test]
async fn test_editor_state_invalid_format() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::GetEditorState, json!({"format": "json"}))
        .await;

    match result {
        Err(RelayError::Validation(msg)) => {
            assert!(msg.contains("\"json\""));
            assert!(msg.contains("Raw, scripts only, no scripts"));
        }
        _ => panic!("Expected Validation for unknown format, got: {:?}", result),
    }
}

#[tokio::test]
async fn test_editor_state_unknown_argument() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::GetEditorState, json!({"verbose": true}))
        .await;

    assert!(matches!(result, Err(RelayError::Validation(_))));
}

#[tokio::test]
async fn test_logs_count_bounds() {
    let handler = create_test_handler();

    for count in [json!(0), json!(1001), json!(-5), json!(2.5), json!("ten")] {
        let result = handler
            .execute(ToolName::GetLogs, json!({"count": count.clone()}))
            .await;
        assert!(
            matches!(result, Err(RelayError::Validation(_))),
            "count {} should be rejected",
            count
        );
    }

    for count in [1, 1000] {
        let result = handler
            .execute(ToolName::GetLogs, json!({"count": count}))
            .await;
        assert_eq!(result.unwrap(), json!([]));
    }
}

#[tokio::test]
async fn test_logs_invalid_type() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::GetLogs, json!({"types": ["Error", "Fatal"]}))
        .await;

    match result {
        Err(RelayError::Validation(msg)) => {
            assert!(msg.contains("\"Fatal\""));
            assert!(msg.contains("Log, Warning, Error, Exception, Assert"));
        }
        _ => panic!("Expected Validation for unknown log type, got: {:?}", result),
    }
}

#[tokio::test]
async fn test_logs_invalid_field() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::GetLogs, json!({"fields": ["message", "level"]}))
        .await;

    match result {
        Err(RelayError::Validation(msg)) => assert!(msg.contains("\"level\"")),
        _ => panic!("Expected Validation for unknown field, got: {:?}", result),
    }
}

#[tokio::test]
async fn test_logs_invalid_timestamp() {
    let handler = create_test_handler();

    let result = handler
        .execute(ToolName::GetLogs, json!({"timestampAfter": "yesterday"}))
        .await;

    match result {
        Err(RelayError::Validation(msg)) => assert!(msg.contains("timestampAfter")),
        _ => panic!("Expected Validation for bad timestamp, got: {:?}", result),
    }
}

#[tokio::test]
async fn test_logs_work_without_editor() {
    let handler = create_test_handler();

    let result = handler.execute(ToolName::GetLogs, serde_json::Value::Null).await;
    assert_eq!(result.unwrap(), json!([]));
}
