use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    backoff::{BackoffPolicy, FailureKind},
    clock::{Sleeper, TokioSleeper},
    metrics::AppMetrics,
    models::{GenerationParams, InferencePayload},
    normalizer::{ResponseNormalizer, UnexpectedFormat},
    upstream::{TransportError, UpstreamResponse, UpstreamTransport},
};

const TOO_MANY_REQUESTS: u16 = 429;
const SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub cold_start_aware: bool,
    pub backoff: BackoffPolicy,
}

impl RetryConfig {
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            cold_start_aware: false,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn cold_start() -> Self {
        Self {
            max_retries: 5,
            cold_start_aware: true,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("API request failed with status 429 after {attempts} attempts: {body}")]
    RateLimited { attempts: u32, body: String },
    #[error("API request failed with status 503 after {attempts} attempts (model loading): {body}")]
    ServiceUnavailable { attempts: u32, body: String },
    #[error("request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        source: TransportError,
    },
    #[error("API request failed with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    UnexpectedFormat(#[from] UnexpectedFormat),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited(String),
    ColdStart(String),
    Transport(TransportError),
}

impl RetryReason {
    fn kind(&self) -> FailureKind {
        match self {
            RetryReason::RateLimited(_) => FailureKind::RateLimited,
            RetryReason::ColdStart(_) => FailureKind::ColdStart,
            RetryReason::Transport(_) => FailureKind::Transient,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RetryReason::RateLimited(_) => "rate_limited",
            RetryReason::ColdStart(_) => "cold_start",
            RetryReason::Transport(_) => "transport",
        }
    }

    fn into_error(self, attempts: u32) -> UpstreamError {
        match self {
            RetryReason::RateLimited(body) => UpstreamError::RateLimited { attempts, body },
            RetryReason::ColdStart(body) => UpstreamError::ServiceUnavailable { attempts, body },
            RetryReason::Transport(source) => UpstreamError::Transport { attempts, source },
        }
    }
}

/// Result of a single HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    RetryableFailure { reason: RetryReason, attempt: u32 },
    FatalFailure(UpstreamError),
}

#[derive(Debug)]
enum RetryState {
    Attempting(u32),
    Retrying { next: u32, delay: Duration },
    Succeeded(String),
    Exhausted(UpstreamError),
    Aborted(UpstreamError),
}

#[derive(Clone)]
pub struct InferenceClient {
    transport: Arc<dyn UpstreamTransport>,
    sleeper: Arc<dyn Sleeper>,
    metrics: Arc<AppMetrics>,
    retry: RetryConfig,
    generation: GenerationParams,
    normalizer: ResponseNormalizer,
}

impl InferenceClient {
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        retry: RetryConfig,
        generation: GenerationParams,
        normalizer: ResponseNormalizer,
    ) -> Self {
        Self {
            transport,
            sleeper: Arc::new(TokioSleeper),
            metrics: Arc::new(AppMetrics::new()),
            retry,
            generation,
            normalizer,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.max_retries.max(1)
    }

    /// Sends `inputs` upstream, retrying transient failures, and returns the normalized reply.
    pub async fn complete(&self, token: &str, inputs: String) -> Result<String, UpstreamError> {
        let payload = InferencePayload {
            inputs,
            parameters: self.generation.clone(),
        };
        let max_attempts = self.max_attempts();
        let mut state = RetryState::Attempting(0);

        loop {
            state = match state {
                RetryState::Attempting(attempt) => {
                    debug!(
                        transport = self.transport.name(),
                        attempt = attempt + 1,
                        max_attempts,
                        "sending upstream request"
                    );
                    let result = self.transport.send(token, &payload).await;
                    match self.classify(attempt, result) {
                        AttemptOutcome::Success(body) => {
                            self.metrics.observe_attempt("success");
                            RetryState::Succeeded(body)
                        }
                        AttemptOutcome::FatalFailure(error) => {
                            self.metrics.observe_attempt("fatal");
                            RetryState::Aborted(error)
                        }
                        AttemptOutcome::RetryableFailure { reason, attempt } => {
                            self.metrics.observe_attempt(reason.label());
                            if attempt + 1 >= max_attempts {
                                RetryState::Exhausted(reason.into_error(attempt + 1))
                            } else {
                                let delay = self.retry.backoff.next_delay(attempt, reason.kind());
                                warn!(
                                    attempt = attempt + 1,
                                    reason = reason.label(),
                                    delay_ms = delay.as_millis() as u64,
                                    "retryable upstream failure"
                                );
                                RetryState::Retrying {
                                    next: attempt + 1,
                                    delay,
                                }
                            }
                        }
                    }
                }
                RetryState::Retrying { next, delay } => {
                    self.sleeper.sleep(delay).await;
                    RetryState::Attempting(next)
                }
                RetryState::Succeeded(body) => {
                    let reply = self.normalizer.normalize_body(&body)?;
                    info!(chars = reply.len(), "upstream reply normalized");
                    return Ok(reply);
                }
                RetryState::Exhausted(error) => {
                    warn!(error = %error, "upstream retries exhausted");
                    return Err(error);
                }
                RetryState::Aborted(error) => {
                    warn!(error = %error, "upstream request failed");
                    return Err(error);
                }
            };
        }
    }

    pub fn classify(
        &self,
        attempt: u32,
        result: Result<UpstreamResponse, TransportError>,
    ) -> AttemptOutcome {
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                return AttemptOutcome::RetryableFailure {
                    reason: RetryReason::Transport(error),
                    attempt,
                };
            }
        };

        if response.is_success() {
            return AttemptOutcome::Success(response.body);
        }

        match response.status {
            TOO_MANY_REQUESTS => AttemptOutcome::RetryableFailure {
                reason: RetryReason::RateLimited(response.body),
                attempt,
            },
            SERVICE_UNAVAILABLE if self.retry.cold_start_aware => {
                AttemptOutcome::RetryableFailure {
                    reason: RetryReason::ColdStart(response.body),
                    attempt,
                }
            }
            status => AttemptOutcome::FatalFailure(UpstreamError::Rejected {
                status,
                body: response.body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::RecordingSleeper, prompt::PromptFormat, upstream::mock::ScriptedTransport};

    fn client(
        transport: Arc<ScriptedTransport>,
        retry: RetryConfig,
        sleeper: Arc<RecordingSleeper>,
    ) -> InferenceClient {
        InferenceClient::new(
            transport,
            retry,
            GenerationParams::default(),
            ResponseNormalizer::new(PromptFormat::LastMessage),
        )
        .with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn rate_limits_back_off_then_succeed() {
        let transport = Arc::new(ScriptedTransport::statuses(
            &[429, 429, 200],
            r#"[{"generated_text":"hello back"}]"#,
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper.clone());

        let reply = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect("third attempt succeeds");

        assert_eq!(reply, "hello back");
        assert_eq!(transport.attempts(), 3);
        let delays = sleeper.delays();
        assert_eq!(delays.len(), 2);
        assert!(delays[0] < delays[1]);
    }

    #[tokio::test]
    async fn cold_start_exhausts_as_service_unavailable() {
        let transport = Arc::new(ScriptedTransport::statuses(&[503; 5], ""));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::cold_start(), sleeper.clone());

        let error = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect_err("every attempt is unavailable");

        assert!(matches!(
            error,
            UpstreamError::ServiceUnavailable { attempts: 5, .. }
        ));
        assert_eq!(transport.attempts(), 5);
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
                Duration::from_secs(30),
            ]
        );
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_reports_last_failure() {
        let transport = Arc::new(ScriptedTransport::statuses(&[429, 429, 429], ""));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper.clone());

        let error = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect_err("rate limited throughout");

        assert!(matches!(error, UpstreamError::RateLimited { attempts: 3, .. }));
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn rejected_status_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new([Ok(UpstreamResponse::new(
            401,
            "Invalid credentials",
        ))]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper.clone());

        let error = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect_err("401 is fatal");

        assert_eq!(
            error,
            UpstreamError::Rejected {
                status: 401,
                body: "Invalid credentials".to_owned()
            }
        );
        assert_eq!(transport.attempts(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn service_unavailable_is_fatal_without_cold_start_awareness() {
        let transport = Arc::new(ScriptedTransport::statuses(&[503, 200], r#"["late"]"#));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper);

        let error = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect_err("503 is an ordinary failure here");

        assert!(matches!(error, UpstreamError::Rejected { status: 503, .. }));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test]
    async fn transport_errors_retry_with_flat_delay_until_exhausted() {
        let failure = || -> Result<UpstreamResponse, TransportError> {
            Err(TransportError::Network("connection reset".to_owned()))
        };
        let transport = Arc::new(ScriptedTransport::new([failure(), failure(), failure()]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper.clone());

        let error = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect_err("network never recovers");

        assert!(matches!(error, UpstreamError::Transport { attempts: 3, .. }));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn attempt_timeout_retries_like_a_network_failure() {
        let transport = Arc::new(ScriptedTransport::new([
            Err(TransportError::Timeout("no response within 10s".to_owned())),
            Ok(UpstreamResponse::new(200, r#"["late but fine"]"#)),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper.clone());

        let reply = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect("second attempt succeeds");

        assert_eq!(reply, "late but fine");
        assert_eq!(transport.attempts(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn timeouts_exhaust_as_transport_failure() {
        let timeout = || -> Result<UpstreamResponse, TransportError> {
            Err(TransportError::Timeout("no response within 10s".to_owned()))
        };
        let transport = Arc::new(ScriptedTransport::new([timeout(), timeout(), timeout()]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper.clone());

        let error = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect_err("upstream never answers in time");

        assert!(matches!(
            error,
            UpstreamError::Transport {
                attempts: 3,
                source: TransportError::Timeout(_),
            }
        ));
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn unparseable_success_body_is_unexpected_format() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], "42"));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper);

        let error = client
            .complete("hf_token", "hello".to_owned())
            .await
            .expect_err("a number is not a reply");

        assert!(matches!(error, UpstreamError::UnexpectedFormat(_)));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test]
    async fn sends_bearer_token_and_generation_parameters() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], r#""ok""#));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), RetryConfig::standard(), sleeper);

        client
            .complete("hf_secret", "what is rust?".to_owned())
            .await
            .expect("request succeeds");

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].token, "hf_secret");
        assert_eq!(sent[0].payload.inputs, "what is rust?");
        assert_eq!(sent[0].payload.parameters, GenerationParams::default());
    }

    #[tokio::test]
    async fn zero_retries_still_makes_one_attempt() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], r#"["one"]"#));
        let sleeper = Arc::new(RecordingSleeper::default());
        let retry = RetryConfig {
            max_retries: 0,
            ..RetryConfig::standard()
        };
        let client = client(transport.clone(), retry, sleeper);

        assert_eq!(client.max_attempts(), 1);
        let reply = client
            .complete("hf_token", "hi".to_owned())
            .await
            .expect("single attempt succeeds");
        assert_eq!(reply, "one");
    }
}
