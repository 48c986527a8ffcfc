use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    models::InferencePayload,
    upstream::{TransportError, UpstreamResponse, UpstreamTransport},
};

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, attempt_timeout: Option<Duration>) -> Result<Self, String> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = attempt_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|error| format!("failed to build upstream HTTP client: {error}"))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    fn name(&self) -> &str {
        "huggingface-inference"
    }

    async fn send(
        &self,
        token: &str,
        payload: &InferencePayload,
    ) -> Result<UpstreamResponse, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        debug!(transport = self.name(), status, bytes = body.len(), "upstream replied");

        Ok(UpstreamResponse { status, body })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}
