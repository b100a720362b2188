//! Unity MCP Relay - MCP server for a live Unity Editor
//!
//! Speaks MCP on stdin/stdout and waits for the Unity Editor plugin on a
//! local WebSocket port.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;
use unity_mcp_relay::{Relay, RelayConfig};

#[derive(Parser)]
#[command(name = "unity-mcp-relay")]
#[command(about = "MCP server that relays tool calls to a live Unity Editor", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/unity-mcp-relay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host the Unity WebSocket endpoint binds to
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port the Unity WebSocket endpoint binds to
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Set log level (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP on stdio and accept the Unity Editor (default)
    Serve,

    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level);
    debug!("unity-mcp-relay v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = RelayConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::PrintConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Keep HTTP request spans quiet unless asked for explicitly
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "unity_mcp_relay={},tower_http=warn",
            level.as_str().to_lowercase()
        ))
    });

    // stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let relay = Relay::start(&config)
        .await
        .context("failed to start the Unity WebSocket endpoint")?;
    info!("Unity Editor endpoint ready on ws://{}", relay.addr());

    tokio::select! {
        result = relay.server().run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping relay gracefully...");
        }
    }

    relay.shutdown().await;
    info!("Relay shut down complete");
    Ok(())
}
