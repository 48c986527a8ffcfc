pub mod http;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::InferencePayload;

/// Raw upstream reply. The body is read in full before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    fn name(&self) -> &str;
    async fn send(
        &self,
        token: &str,
        payload: &InferencePayload,
    ) -> Result<UpstreamResponse, TransportError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("attempt timed out: {0}")]
    Timeout(String),
}
