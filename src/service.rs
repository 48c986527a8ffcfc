use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    client::InferenceClient,
    config::{RelayConfig, TOKEN_PREFIX},
    errors::{ChatError, ErrorEnvelope},
    metrics::AppMetrics,
    models::{ChatMessage, ChatReply},
    normalizer::ResponseNormalizer,
    prompt::PromptFormat,
    upstream::UpstreamTransport,
};

/// Validates chat requests and turns inference results into replies or envelopes.
#[derive(Clone)]
pub struct ChatService {
    token: Option<String>,
    client: InferenceClient,
    prompt_format: PromptFormat,
    metrics: Arc<AppMetrics>,
}

impl ChatService {
    pub fn new(
        token: Option<String>,
        client: InferenceClient,
        prompt_format: PromptFormat,
    ) -> Self {
        Self {
            token,
            client,
            prompt_format,
            metrics: Arc::new(AppMetrics::new()),
        }
    }

    pub fn from_config(
        config: &RelayConfig,
        transport: Arc<dyn UpstreamTransport>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let client = InferenceClient::new(
            transport,
            config.retry.clone(),
            config.generation.clone(),
            ResponseNormalizer::new(config.prompt_format),
        )
        .with_metrics(metrics.clone());

        Self::new(config.token.clone(), client, config.prompt_format).with_metrics(metrics)
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Handles a raw request body as posted by the browser.
    pub async fn respond(&self, body: &[u8]) -> Result<ChatReply, ErrorEnvelope> {
        let result = self.handle_body(body).await;
        self.finish(result)
    }

    /// Handles an already-typed history.
    pub async fn reply_to(&self, messages: &[ChatMessage]) -> Result<ChatReply, ErrorEnvelope> {
        let result = self.handle_messages(messages).await;
        self.finish(result)
    }

    async fn handle_body(&self, body: &[u8]) -> Result<ChatReply, ChatError> {
        let token = self.credential()?;
        let messages = parse_messages(body)?;
        self.dispatch(token, &messages).await
    }

    async fn handle_messages(&self, messages: &[ChatMessage]) -> Result<ChatReply, ChatError> {
        let token = self.credential()?;
        if messages.is_empty() {
            return Err(ChatError::Validation("messages must not be empty".to_owned()));
        }
        self.dispatch(token, messages).await
    }

    fn credential(&self) -> Result<&str, ChatError> {
        let token = self.token.as_deref().ok_or_else(|| {
            error!("upstream API token is missing");
            ChatError::MissingCredential
        })?;
        if !token.starts_with(TOKEN_PREFIX) {
            error!(
                token_len = token.len(),
                "upstream API token has the wrong prefix"
            );
            return Err(ChatError::MalformedCredential);
        }
        Ok(token)
    }

    async fn dispatch(
        &self,
        token: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatReply, ChatError> {
        let inputs = self.prompt_format.render(messages);
        info!(
            turns = messages.len(),
            input_chars = inputs.len(),
            format = ?self.prompt_format,
            "dispatching chat request"
        );
        let content = self.client.complete(token, inputs).await?;
        Ok(ChatReply::assistant(content))
    }

    fn finish(&self, result: Result<ChatReply, ChatError>) -> Result<ChatReply, ErrorEnvelope> {
        result.map_err(|error| {
            self.metrics.observe_chat_error(error.kind());
            warn!(kind = error.kind(), error = %error, "chat request failed");
            ErrorEnvelope::from(error)
        })
    }
}

pub fn parse_messages(body: &[u8]) -> Result<Vec<ChatMessage>, ChatError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|error| ChatError::Validation(format!("request body is not JSON: {error}")))?;
    let items = match value.get("messages") {
        None | Some(Value::Null) => {
            return Err(ChatError::Validation("messages field is missing".to_owned()));
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ChatError::Validation("messages must be an array".to_owned()));
        }
    };
    if items.is_empty() {
        return Err(ChatError::Validation("messages must not be empty".to_owned()));
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            ChatMessage::deserialize(item).map_err(|error| {
                ChatError::Validation(format!("message {index} is invalid: {error}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::RetryConfig, clock::RecordingSleeper, models::GenerationParams,
        upstream::mock::ScriptedTransport,
    };

    fn service(token: Option<&str>, transport: Arc<ScriptedTransport>) -> ChatService {
        let client = InferenceClient::new(
            transport,
            RetryConfig::cold_start(),
            GenerationParams::default(),
            ResponseNormalizer::default(),
        )
        .with_sleeper(Arc::new(RecordingSleeper::default()));
        ChatService::new(token.map(ToOwned::to_owned), client, PromptFormat::LastMessage)
    }

    const HELLO: &[u8] = br#"{"messages":[{"role":"user","content":"hello"}]}"#;

    #[tokio::test]
    async fn missing_token_never_calls_upstream() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], r#""hi""#));
        let envelope = service(None, transport.clone())
            .respond(HELLO)
            .await
            .expect_err("token is required");

        assert_eq!(envelope.status_code, 500);
        assert_eq!(envelope.user_message, "Hugging Face API token is not configured");
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn token_prefix_is_checked_before_the_body() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], r#""hi""#));
        let envelope = service(Some("sk-wrong"), transport.clone())
            .respond(b"not json")
            .await
            .expect_err("prefix is wrong");

        assert_eq!(envelope.status_code, 500);
        assert!(envelope.user_message.contains("should start with 'hf_'"));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let bodies: [&[u8]; 5] = [
            b"{}",
            br#"{"messages":"hello"}"#,
            br#"{"messages":[]}"#,
            br#"{"messages":[{"role":"robot","content":"beep"}]}"#,
            b"{",
        ];
        for body in bodies {
            let transport = Arc::new(ScriptedTransport::statuses(&[200], r#""hi""#));
            let envelope = service(Some("hf_ok"), transport.clone())
                .respond(body)
                .await
                .expect_err("body is invalid");
            assert_eq!(envelope.status_code, 400);
            assert_eq!(envelope.user_message, "Invalid messages format");
            assert!(envelope.technical_detail.is_some());
            assert_eq!(transport.attempts(), 0);
        }
    }

    #[tokio::test]
    async fn replies_with_newest_message_answer() {
        let transport = Arc::new(ScriptedTransport::statuses(
            &[503, 200],
            r#"[{"generated_text":" Hi! "}]"#,
        ));
        let reply = service(Some("hf_ok"), transport.clone())
            .respond(
                concat!(
                    r#"{"messages":[{"role":"user","content":"first"},"#,
                    r#"{"role":"assistant","content":"ok"},"#,
                    r#"{"role":"user","content":"second"}]}"#,
                )
                .as_bytes(),
            )
            .await
            .expect("second attempt succeeds");

        assert_eq!(reply, ChatReply::assistant("Hi!"));
        assert_eq!(transport.sent()[0].payload.inputs, "second");
    }

    #[tokio::test]
    async fn cold_start_exhaustion_maps_to_starting_message() {
        let transport = Arc::new(ScriptedTransport::statuses(&[503; 5], ""));
        let envelope = service(Some("hf_ok"), transport.clone())
            .respond(HELLO)
            .await
            .expect_err("model never loads");

        assert_eq!(envelope.status_code, 503);
        assert!(envelope.user_message.contains("starting up"));
        assert!(envelope
            .technical_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("503")));
    }

    #[tokio::test]
    async fn typed_history_must_not_be_empty() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], r#""hi""#));
        let envelope = service(Some("hf_ok"), transport.clone())
            .reply_to(&[])
            .await
            .expect_err("nothing to answer");
        assert_eq!(envelope.status_code, 400);
        assert_eq!(transport.attempts(), 0);
    }
}
