use serde_json::Value;
use thiserror::Error;

use crate::prompt::{PromptFormat, ROLE_MARKERS};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unexpected response format from API: {0}")]
pub struct UnexpectedFormat(pub String);

/// Every upstream success body we know how to read, plus a catch-all.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamPayload {
    GeneratedText(String),
    TextList(String),
    Text(String),
    Unrecognized(Value),
}

impl UpstreamPayload {
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(items) => match items.into_iter().next() {
                Some(Value::Object(first)) => match first.get("generated_text") {
                    Some(Value::String(text)) if !text.is_empty() => {
                        Self::GeneratedText(text.clone())
                    }
                    _ => Self::Unrecognized(Value::Object(first)),
                },
                Some(Value::String(text)) => Self::TextList(text),
                Some(other) => Self::Unrecognized(Value::Array(vec![other])),
                None => Self::Unrecognized(Value::Array(Vec::new())),
            },
            Value::String(text) => Self::Text(text),
            other => Self::Unrecognized(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseNormalizer {
    format: PromptFormat,
}

impl ResponseNormalizer {
    pub fn new(format: PromptFormat) -> Self {
        Self { format }
    }

    pub fn normalize_body(&self, body: &str) -> Result<String, UnexpectedFormat> {
        let value: Value =
            serde_json::from_str(body).map_err(|error| UnexpectedFormat(error.to_string()))?;
        self.normalize(value)
    }

    pub fn normalize(&self, value: Value) -> Result<String, UnexpectedFormat> {
        let text = match UpstreamPayload::classify(value) {
            UpstreamPayload::GeneratedText(text)
            | UpstreamPayload::TextList(text)
            | UpstreamPayload::Text(text) => text,
            UpstreamPayload::Unrecognized(value) => {
                return Err(UnexpectedFormat(preview(&value)));
            }
        };
        Ok(self.clean(&text))
    }

    /// Trim, drop echoed role markers, trim again. Idempotent.
    pub fn clean(&self, text: &str) -> String {
        if !self.format.strips_markers() {
            return text.trim().to_owned();
        }

        let mut current = text.trim().to_owned();
        loop {
            let mut stripped = current.clone();
            for marker in ROLE_MARKERS {
                stripped = stripped.replace(marker, "");
            }
            let stripped = stripped.trim().to_owned();
            if stripped == current {
                return current;
            }
            current = stripped;
        }
    }
}

fn preview(value: &Value) -> String {
    value.to_string().chars().take(200).collect()
}
