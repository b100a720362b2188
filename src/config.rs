//! Layered configuration for the relay
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI flags (applied by the binary after loading)
//! 2. Environment variables prefixed `UNITY_MCP_` (e.g. `UNITY_MCP_PORT=9000`)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! The default file location is `$XDG_CONFIG_HOME/unity-mcp-relay/config.toml`.
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 8080
//! command_timeout_ms = 60000
//! state_timeout_ms = 30000
//! log_capacity = 1000
//! connect_retry_attempts = 5
//! connect_retry_delay_ms = 5000
//! package_path_prefix = "Packages/"
//! resources_dir = "/path/to/help/texts"
//! ```

use crate::error::{RelayError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "UNITY_MCP";

/// Default listening host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listening port (the Unity plugin connects to ws://localhost:8080)
pub const DEFAULT_PORT: u16 = 8080;

/// Default capacity of the log ring buffer
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Host the WebSocket endpoint binds to
    pub host: String,

    /// Port the WebSocket endpoint binds to (0 picks an ephemeral port)
    pub port: u16,

    /// Bound on waiting for a `commandResult` reply
    pub command_timeout_ms: u64,

    /// Bound on waiting for an `editorState` reply
    pub state_timeout_ms: u64,

    /// Number of log records retained
    pub log_capacity: usize,

    /// How many times a tool call waits for the Editor before failing
    pub connect_retry_attempts: u32,

    /// How long each of those waits lasts
    pub connect_retry_delay_ms: u64,

    /// Project paths under this prefix are dropped from editor snapshots.
    /// An empty string disables the filter.
    pub package_path_prefix: String,

    /// Directory of extra text resources exposed over MCP
    pub resources_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            command_timeout_ms: 60_000,
            state_timeout_ms: 30_000,
            log_capacity: DEFAULT_LOG_CAPACITY,
            connect_retry_attempts: 5,
            connect_retry_delay_ms: 5_000,
            package_path_prefix: "Packages/".to_string(),
            resources_dir: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from defaults, the given (or default) file, and env.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_layered(Some(path), true),
            None => {
                let default_path = default_config_path();
                Self::load_layered(default_path.as_deref(), false)
            }
        }
    }

    fn load_layered(path: Option<&Path>, required: bool) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("host", defaults.host.clone())?
            .set_default("port", i64::from(defaults.port))?
            .set_default("command_timeout_ms", defaults.command_timeout_ms as i64)?
            .set_default("state_timeout_ms", defaults.state_timeout_ms as i64)?
            .set_default("log_capacity", defaults.log_capacity as i64)?
            .set_default(
                "connect_retry_attempts",
                i64::from(defaults.connect_retry_attempts),
            )?
            .set_default(
                "connect_retry_delay_ms",
                defaults.connect_retry_delay_ms as i64,
            )?
            .set_default("package_path_prefix", defaults.package_path_prefix.clone())?;

        if let Some(path) = path {
            debug!("Loading configuration file: {}", path.display());
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Toml).required(required),
            );
        }

        let config: RelayConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the relay unusable
    pub fn validate(&self) -> Result<()> {
        if self.log_capacity == 0 {
            return Err(invalid("log_capacity must be at least 1"));
        }
        if self.command_timeout_ms == 0 || self.state_timeout_ms == 0 {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if self.connect_retry_attempts == 0 {
            return Err(invalid("connect_retry_attempts must be at least 1"));
        }
        if self.host.trim().is_empty() {
            return Err(invalid("host cannot be empty"));
        }
        Ok(())
    }

    /// Resolve host and port into a bindable socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| invalid(format!("host '{}' did not resolve", self.host)))
    }

    /// Command reply bound
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// State reply bound
    pub fn state_timeout(&self) -> Duration {
        Duration::from_millis(self.state_timeout_ms)
    }

    /// Delay between connection checks before a tool call gives up
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    /// Package prefix to filter, if filtering is enabled
    pub fn package_filter(&self) -> Option<&str> {
        let prefix = self.package_path_prefix.as_str();
        (!prefix.is_empty()).then_some(prefix)
    }
}

/// Default configuration file path (`$XDG_CONFIG_HOME/unity-mcp-relay/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("unity-mcp-relay").join("config.toml"))
}

fn invalid(message: impl Into<String>) -> RelayError {
    RelayError::Config(config::ConfigError::Message(message.into()))
}
