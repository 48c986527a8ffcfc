use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    errors::ErrorEnvelope,
    models::SuggestionsResponse,
    state::AppState,
    suggestions::{random_suggestions, DEFAULT_COUNT},
};

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => ErrorEnvelope::new(500, "Something went wrong. Please try again.")
            .with_detail(format!("metrics render failed: {error}"))
            .into_response(),
    }
}

pub async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();

    let response = match state.chat.respond(&body).await {
        Ok(reply) => {
            info!(chars = reply.message.content.len(), "chat reply sent");
            Json(reply).into_response()
        }
        Err(envelope) => envelope.into_response(),
    };

    state.metrics.observe_request(
        "/api/chat",
        "POST",
        response.status().as_u16(),
        started.elapsed(),
    );

    response
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    #[serde(default)]
    pub count: Option<usize>,
}

pub async fn suggestions(Query(query): Query<SuggestionsQuery>) -> Json<SuggestionsResponse> {
    Json(SuggestionsResponse {
        suggestions: random_suggestions(query.count.unwrap_or(DEFAULT_COUNT)),
    })
}
