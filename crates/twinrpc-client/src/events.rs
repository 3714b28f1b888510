//! Client events and exception reporting

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use twinrpc_core::models::{RequestId, RpcError};
use twinrpc_core::DecodeError;

/// Local failures. These are reported through the exception signal and never
/// returned to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Server(RpcError),

    #[error("Server response contains unregistered request id {0} or an echoed notification")]
    UnregisteredId(RequestId),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Decode(#[from] DecodeError),
}

impl ClientError {
    pub fn title(&self) -> &'static str {
        match self {
            ClientError::Server(_) => "Server message",
            ClientError::UnregisteredId(_) => "Request error",
            ClientError::Configuration(_) => "Configuration error",
            ClientError::Connection(_) => "Connection error",
            ClientError::Decode(_) => "Decode error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientException {
    pub error: ClientError,
    pub time: DateTime<Utc>,
}

impl ClientException {
    pub fn new(error: ClientError) -> Self {
        Self {
            error,
            time: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Initialized,
    /// Fired right before a result is handed to its callback
    BeforeResult { id: RequestId, method: String },
    Exception(ClientException),
}

pub type ExceptionHandler = Arc<dyn Fn(&ClientException) + Send + Sync>;

/// Broadcasts client events and routes exceptions to the configured handler
pub struct EventManager {
    event_tx: broadcast::Sender<ClientEvent>,
    handler: RwLock<Option<ExceptionHandler>>,
}

impl EventManager {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            event_tx,
            handler: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn set_exception_handler(&self, handler: ExceptionHandler) {
        if let Ok(mut slot) = self.handler.write() {
            *slot = Some(handler);
        }
    }

    /// Report a local failure. Without a handler the failure is logged.
    pub fn raise(&self, error: ClientError) {
        let exception = ClientException::new(error);
        self.emit(ClientEvent::Exception(exception.clone()));

        let handler = self.handler.read().ok().and_then(|slot| slot.clone());
        match handler {
            Some(handler) => handler(&exception),
            None => tracing::warn!(
                "twinrpc client exception [{}]: {}",
                exception.error.title(),
                exception.error
            ),
        }
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}
