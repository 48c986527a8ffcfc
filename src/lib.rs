pub mod backoff;
pub mod client;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod prompt;
pub mod service;
pub mod state;
pub mod suggestions;
pub mod upstream;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use config::RelayConfig;
use tracing::info;
use upstream::{http::HttpTransport, UpstreamTransport};

pub fn build_state(config: &RelayConfig) -> Result<state::AppState, std::io::Error> {
    let transport: Arc<dyn UpstreamTransport> = Arc::new(
        HttpTransport::new(config.upstream_url.clone(), config.attempt_timeout)
            .map_err(std::io::Error::other)?,
    );
    info!(
        upstream = %config.upstream_url,
        max_retries = config.retry.max_retries,
        cold_start_aware = config.retry.cold_start_aware,
        prompt_format = ?config.prompt_format,
        token_configured = config.token.is_some(),
        "chat relay configured"
    );
    Ok(state::AppState::new(config, transport))
}

pub fn build_app(state: state::AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/api/chat", post(handlers::chat))
        .route("/api/suggestions", get(handlers::suggestions))
        .with_state(state)
}
