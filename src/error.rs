//! Error types for the Unity MCP relay
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation at the
//! binary edge.

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Tool arguments failed validation (never reaches the network)
    #[error("{0}")]
    Validation(String),

    /// No Unity Editor peer is connected
    #[error("Unity Editor is not connected. Please ensure the Unity Editor is running and the UnityMCP window is open.")]
    NotConnected,

    /// A correlated reply did not arrive within its bound
    #[error("{operation} timed out after {seconds} seconds. This may indicate a long-running operation or an issue with the Unity Editor.")]
    Timeout {
        /// Human-readable name of the operation that timed out
        operation: String,
        /// The bound that elapsed, in whole seconds
        seconds: u64,
    },

    /// The Unity Editor reported a failure
    #[error("{message}")]
    RemoteExecution {
        /// Remote failure message
        message: String,
        /// Remote stack trace, when the Editor provided one
        stack_trace: Option<String>,
    },

    /// Malformed inbound frame or unexpected payload shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The WebSocket listener could not bind
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address we attempted to bind
        addr: SocketAddr,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Build a validation error from any message
    pub fn validation(message: impl Into<String>) -> Self {
        RelayError::Validation(message.into())
    }

    /// True for errors caused by the caller's arguments
    pub fn is_validation(&self) -> bool {
        matches!(self, RelayError::Validation(_))
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Convert anyhow::Error to RelayError
impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        RelayError::Other(err.to_string())
    }
}
