//! MCP authenticating reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ request id / trace ──▶ auth gate ──▶ /health, /session
//!                                           │
//!                                           ▼
//!                                      proxy core ──▶ breaker admission
//!                                           │
//!                        ┌──────────────────┼───────────────────┐
//!                        ▼                  ▼                   ▼
//!                   buffered + retry      SSE relay      WebSocket takeover
//!                        │                  │                   │
//!                        └──────────────────┴───────────────────┴──▶ Backend
//! ```
//!
//! # Startup Order
//! - Configuration (file, then environment), validated
//! - Logging, then the metrics exporter
//! - Listener last, so traffic only arrives once everything is ready

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use mcp_auth_proxy::config::load_config;
use mcp_auth_proxy::lifecycle::{wait_for_signal, Shutdown};
use mcp_auth_proxy::observability::{logging::init_logging, metrics::init_metrics};
use mcp_auth_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "mcp-auth-proxy")]
#[command(about = "Authenticating reverse proxy for MCP servers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    if cli.check_config {
        println!("configuration OK");
        return Ok(());
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mcp-auth-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %format!("{}://{}:{}", config.backend.scheme, config.backend.host, config.backend.port),
        auth_mode = ?config.auth.mode,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let server = HttpServer::new(config.clone())?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let signal = wait_for_signal().await;
            tracing::info!(signal, "Termination signal received");
            shutdown.trigger();
        }
    });

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
