use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::UpstreamError;

const BUSY_MESSAGE: &str =
    "The chat service is temporarily busy. Please try again in a few seconds.";
const STARTING_MESSAGE: &str =
    "The chat model is still starting up. Please try again in a moment.";
const AUTH_MESSAGE: &str = "Authentication failed. \
    Please check your Hugging Face account and generate a new API token.";
const FORMAT_MESSAGE: &str = "The chat service returned an unexpected response. Please try again.";
const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";
const INVALID_MESSAGES: &str = "Invalid messages format";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Hugging Face API token is not configured")]
    MissingCredential,
    #[error("Invalid Hugging Face API token format. Token should start with 'hf_'")]
    MalformedCredential,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ChatError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::MissingCredential | ChatError::MalformedCredential => "configuration",
            ChatError::Validation(_) => "validation",
            ChatError::Upstream(UpstreamError::RateLimited { .. }) => "rate_limited",
            ChatError::Upstream(UpstreamError::ServiceUnavailable { .. }) => "service_unavailable",
            ChatError::Upstream(UpstreamError::Transport { .. }) => "transport",
            ChatError::Upstream(UpstreamError::Rejected { .. }) => "upstream_rejected",
            ChatError::Upstream(UpstreamError::UnexpectedFormat(_)) => "unexpected_format",
        }
    }
}

/// The only failure shape handed back to chat clients.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{user_message}")]
pub struct ErrorEnvelope {
    #[serde(rename = "error")]
    pub user_message: String,
    #[serde(
        rename = "technicalError",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub technical_detail: Option<String>,
    #[serde(rename = "status")]
    pub status_code: u16,
}

impl ErrorEnvelope {
    pub fn new(status_code: u16, user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            technical_detail: None,
            status_code,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.technical_detail = Some(detail.into());
        self
    }

    /// Text shown in the chat error banner.
    pub fn display_text(&self) -> String {
        match &self.technical_detail {
            Some(detail) => format!("{} (Technical details: {detail})", self.user_message),
            None => self.user_message.clone(),
        }
    }
}

impl From<ChatError> for ErrorEnvelope {
    fn from(error: ChatError) -> Self {
        let detail = error.to_string();
        match error {
            ChatError::MissingCredential | ChatError::MalformedCredential => {
                ErrorEnvelope::new(500, detail)
            }
            ChatError::Validation(_) => {
                ErrorEnvelope::new(400, INVALID_MESSAGES).with_detail(detail)
            }
            ChatError::Upstream(upstream) => {
                let (status, message) = match &upstream {
                    UpstreamError::RateLimited { .. } => (429, BUSY_MESSAGE),
                    UpstreamError::ServiceUnavailable { .. } => (503, STARTING_MESSAGE),
                    UpstreamError::Rejected {
                        status: 401 | 403, ..
                    } => (502, AUTH_MESSAGE),
                    UpstreamError::UnexpectedFormat(_) => (502, FORMAT_MESSAGE),
                    UpstreamError::Transport { .. } | UpstreamError::Rejected { .. } => {
                        (502, GENERIC_MESSAGE)
                    }
                };
                ErrorEnvelope::new(status, message).with_detail(detail)
            }
        }
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
