//! Client-side conversation state: ordered history, a single in-flight request,
//! optimistic append of the user's turn and rollback when the relay fails.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    errors::ErrorEnvelope,
    models::{ChatMessage, ChatReply, ChatRequest, MessageRole},
    service::ChatService,
};

const INVALID_REPLY: &str = "Invalid response from server";
const SEND_FAILED: &str = "Failed to send message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
    pub is_voice_origin: bool,
}

impl Message {
    fn new(role: MessageRole, content: String, is_voice_origin: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: unix_millis(),
            is_voice_origin,
        }
    }

    fn to_wire(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub pending: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input or another request already in flight; nothing changed.
    Ignored,
    Replied(Message),
    Failed(ErrorEnvelope),
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send(&self, messages: &[ChatMessage]) -> Result<ChatReply, ErrorEnvelope>;
}

#[async_trait]
impl ChatApi for ChatService {
    async fn send(&self, messages: &[ChatMessage]) -> Result<ChatReply, ErrorEnvelope> {
        self.reply_to(messages).await
    }
}

/// Talks to a running relay over HTTP.
#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| format!("failed to build relay HTTP client: {error}"))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send(&self, messages: &[ChatMessage]) -> Result<ChatReply, ErrorEnvelope> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest { messages })
            .send()
            .await
            .map_err(|error| {
                ErrorEnvelope::new(503, SEND_FAILED).with_detail(error.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| {
                ErrorEnvelope::new(status, SEND_FAILED).with_detail(error.to_string())
            })?;

        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
            return Err(envelope);
        }
        if !(200..300).contains(&status) {
            return Err(ErrorEnvelope::new(status, SEND_FAILED).with_detail(body));
        }
        serde_json::from_str::<ChatReply>(&body).map_err(|error| {
            ErrorEnvelope::new(status, INVALID_REPLY).with_detail(error.to_string())
        })
    }
}

pub struct ConversationStore {
    api: Arc<dyn ChatApi>,
    state: watch::Sender<ConversationState>,
}

impl ConversationStore {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        let (state, _) = watch::channel(ConversationState::default());
        Self { api, state }
    }

    pub fn snapshot(&self) -> ConversationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.state.subscribe()
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().pending
    }

    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        self.submit_as(text, false).await
    }

    pub async fn submit_suggestion(&self, text: &str) -> SubmitOutcome {
        self.submit_as(text, false).await
    }

    /// Same as [`submit`](Self::submit) for text produced by speech capture.
    pub async fn submit_voice(&self, text: &str) -> SubmitOutcome {
        self.submit_as(text, true).await
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.last_error.take().is_some());
    }

    async fn submit_as(&self, text: &str, is_voice_origin: bool) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        let message = Message::new(MessageRole::User, text.to_owned(), is_voice_origin);
        let message_id = message.id;
        let mut history = None;
        self.state.send_if_modified(|state| {
            if state.pending {
                return false;
            }
            state.messages.push(message);
            state.pending = true;
            state.last_error = None;
            history = Some(state.messages.iter().map(Message::to_wire).collect::<Vec<_>>());
            true
        });
        let Some(history) = history else {
            debug!("submit ignored while a request is pending");
            return SubmitOutcome::Ignored;
        };

        let guard = PendingGuard {
            state: &self.state,
            message_id,
            armed: true,
        };
        let outcome = match self.api.send(&history).await {
            Ok(reply) if !reply.message.content.trim().is_empty() => SubmitOutcome::Replied(
                Message::new(MessageRole::Assistant, reply.message.content, false),
            ),
            Ok(_) => SubmitOutcome::Failed(ErrorEnvelope::new(502, INVALID_REPLY)),
            Err(envelope) => SubmitOutcome::Failed(envelope),
        };
        guard.finish(&outcome);
        outcome
    }
}

/// Clears `pending` and rolls back the optimistic turn if the submit future is dropped.
struct PendingGuard<'a> {
    state: &'a watch::Sender<ConversationState>,
    message_id: Uuid,
    armed: bool,
}

impl PendingGuard<'_> {
    fn finish(mut self, outcome: &SubmitOutcome) {
        self.armed = false;
        let message_id = self.message_id;
        self.state.send_modify(|state| {
            match outcome {
                SubmitOutcome::Replied(reply) => state.messages.push(reply.clone()),
                SubmitOutcome::Failed(envelope) => {
                    warn!(
                        status = envelope.status_code,
                        error = %envelope,
                        "chat request rolled back"
                    );
                    state.messages.retain(|message| message.id != message_id);
                    state.last_error = Some(envelope.display_text());
                }
                SubmitOutcome::Ignored => {}
            }
            state.pending = false;
        });
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let message_id = self.message_id;
        self.state.send_modify(|state| {
            state.messages.retain(|message| message.id != message_id);
            state.pending = false;
        });
    }
}

fn unix_millis() -> i64 {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
