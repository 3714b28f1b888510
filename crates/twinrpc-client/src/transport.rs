//! Request/response transport

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;

use twinrpc_core::models::ClientConfig;
use twinrpc_core::Protocol;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Other(String),
}

/// One request payload in, one response payload out
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, protocol: Protocol, payload: String) -> Result<String, TransportError>;
}

/// Posts payloads to an HTTP endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(config.url.clone(), Duration::from_millis(config.timeout_ms))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, protocol: Protocol, payload: String) -> Result<String, TransportError> {
        tracing::debug!("POST {} ({} bytes, {})", self.url, payload.len(), protocol);

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, protocol.content_type())
            .header(ACCEPT, protocol.media_type())
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}
