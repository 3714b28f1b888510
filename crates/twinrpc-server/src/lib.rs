//! TwinRPC Server Library
//!
//! Dispatches JSON-RPC 2.0 or XML-RPC payloads to a capability set and serves
//! them over HTTP.

pub mod api;
pub mod dispatch;
pub mod http;
pub mod logging;

pub use dispatch::{Capability, CapabilityError, CapabilitySet, Dispatcher, FnCapability};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;

use twinrpc_core::models::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] twinrpc_core::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(capabilities: CapabilitySet, config: &ServerConfig) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(capabilities, config)),
        }
    }
}

pub fn build_app(state: AppState, path: &str) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route(path, post(http::handlers::rpc_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

/// Serve `capabilities` on an already bound listener until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    config: &ServerConfig,
    capabilities: CapabilitySet,
    shutdown: F,
) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let app = build_app(AppState::new(capabilities, config), &config.path);
    tracing::info!(
        "TwinRPC server listening on {}{} ({})",
        listener.local_addr()?,
        config.path,
        config.protocol
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("TwinRPC server stopped");
    Ok(())
}
