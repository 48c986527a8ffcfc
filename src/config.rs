use std::{env, net::SocketAddr, time::Duration};

use crate::{
    backoff::{BackoffPolicy, GenericCurve},
    client::RetryConfig,
    models::GenerationParams,
    prompt::PromptFormat,
};

pub const DEFAULT_UPSTREAM_URL: &str =
    "https://api-inference.huggingface.co/models/google/flan-t5-small";
pub const TOKEN_PREFIX: &str = "hf_";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub token: Option<String>,
    pub upstream_url: String,
    pub retry: RetryConfig,
    pub prompt_format: PromptFormat,
    pub generation: GenerationParams,
    pub attempt_timeout: Option<Duration>,
    pub bind_addr: SocketAddr,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            token: None,
            upstream_url: DEFAULT_UPSTREAM_URL.to_owned(),
            retry: RetryConfig::standard(),
            prompt_format: PromptFormat::LastMessage,
            generation: GenerationParams::default(),
            attempt_timeout: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Unknown or unparseable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let read_u64 = |name: &str| read(name).and_then(|value| value.parse::<u64>().ok());
        let defaults = Self::default();

        let mut retry = match read("CHAT_RETRY_PROFILE").as_deref() {
            Some("cold-start") | Some("cold_start") => RetryConfig::cold_start(),
            _ => RetryConfig::standard(),
        };
        if let Some(max_retries) = read("CHAT_MAX_RETRIES").and_then(|value| value.parse().ok()) {
            retry.max_retries = max_retries;
        }
        if let Some(aware) = read("CHAT_COLD_START_AWARE") {
            retry.cold_start_aware = aware != "0" && !aware.eq_ignore_ascii_case("false");
        }

        let base = BackoffPolicy::default();
        retry.backoff = BackoffPolicy {
            rate_base: read_u64("CHAT_BACKOFF_RATE_MS")
                .map(Duration::from_millis)
                .unwrap_or(base.rate_base),
            cold_base: read_u64("CHAT_BACKOFF_COLD_MS")
                .map(Duration::from_millis)
                .unwrap_or(base.cold_base),
            generic_base: read_u64("CHAT_BACKOFF_GENERIC_MS")
                .map(Duration::from_millis)
                .unwrap_or(base.generic_base),
            generic_curve: match read("CHAT_BACKOFF_GENERIC_CURVE").as_deref() {
                Some("linear") => GenericCurve::Linear,
                _ => base.generic_curve,
            },
            max_delay: read_u64("CHAT_BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(base.max_delay),
        };

        let generation = GenerationParams {
            max_length: read("CHAT_MAX_LENGTH")
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.generation.max_length),
            temperature: read("CHAT_TEMPERATURE")
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.generation.temperature),
        };

        Self {
            token: lookup("HUGGING_FACE_API_TOKEN").filter(|value| !value.is_empty()),
            upstream_url: read("CHAT_UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            retry,
            prompt_format: read("CHAT_PROMPT_FORMAT")
                .and_then(|value| PromptFormat::parse(&value))
                .unwrap_or(defaults.prompt_format),
            generation,
            attempt_timeout: read_u64("CHAT_ATTEMPT_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            bind_addr: read("CHAT_BIND_ADDR")
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.bind_addr),
        }
    }
}
