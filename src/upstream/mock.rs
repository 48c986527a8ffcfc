use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    models::InferencePayload,
    upstream::{TransportError, UpstreamResponse, UpstreamTransport},
};

type Step = Result<UpstreamResponse, TransportError>;

/// Replays a fixed sequence of upstream outcomes and records what was sent.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    name: String,
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<SentRequest>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub token: String,
    pub payload: InferencePayload,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            name: "scripted-transport".to_owned(),
            script: Mutex::new(steps.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn statuses(statuses: &[u16], success_body: &str) -> Self {
        Self::new(statuses.iter().map(|&status| {
            let body = if (200..300).contains(&status) {
                success_body.to_owned()
            } else {
                format!("{{\"error\":\"status {status}\"}}")
            };
            Ok(UpstreamResponse::new(status, body))
        }))
    }

    pub fn attempts(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        token: &str,
        payload: &InferencePayload,
    ) -> Result<UpstreamResponse, TransportError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentRequest {
                token: token.to_owned(),
                payload: payload.clone(),
            });
        }

        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        debug!(transport = %self.name, exhausted = next.is_none(), "scripted step");
        next.unwrap_or_else(|| Err(TransportError::Network("script exhausted".to_owned())))
    }
}
