//! TwinRPC Daemon
//!
//! Serves the demo capability set over JSON-RPC 2.0 or XML-RPC.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use twinrpc_core::models::ServerConfig;
use twinrpc_core::storage::ConfigStorage;
use twinrpc_core::Protocol;
use twinrpc_server::{api, logging};

#[derive(Parser, Debug)]
#[command(name = "twinrpcd")]
#[command(about = "TwinRPC daemon - JSON-RPC 2.0 and XML-RPC server", long_about = None)]
struct Args {
    /// JSON config file, created with defaults when missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,

    /// Endpoint path
    #[arg(long)]
    path: Option<String>,

    /// Wire protocol (json-rpc or xml-rpc)
    #[arg(long)]
    protocol: Option<Protocol>,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Include the offending request in error replies
    #[arg(long)]
    expose_error_source: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<ServerConfig> {
        let mut config: ServerConfig = match &self.config {
            Some(path) => ConfigStorage::new(path)
                .load()
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.expose_error_source {
            config.expose_error_source = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;

    logging::init_logging(&config.log_level);

    tracing::info!("TwinRPC daemon starting...");
    if let Some(path) = &args.config {
        tracing::info!("Config file: {}", path.display());
    }

    let capabilities = api::demo_capabilities();
    tracing::info!("Registered capabilities: {}", capabilities.names().join(", "));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    twinrpc_server::serve(listener, &config, capabilities, shutdown_signal()).await?;

    tracing::info!("TwinRPC daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
