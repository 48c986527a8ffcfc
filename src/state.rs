use std::sync::Arc;

use crate::{
    client::InferenceClient,
    clock::RecordingSleeper,
    config::RelayConfig,
    metrics::AppMetrics,
    normalizer::ResponseNormalizer,
    service::ChatService,
    upstream::UpstreamTransport,
};

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub metrics: Arc<AppMetrics>,
}

impl AppState {
    pub fn new(config: &RelayConfig, transport: Arc<dyn UpstreamTransport>) -> Self {
        let metrics = Arc::new(AppMetrics::new());
        let chat = ChatService::from_config(config, transport, metrics.clone());
        Self {
            chat: Arc::new(chat),
            metrics,
        }
    }

    /// Same wiring, but backoff delays are recorded instead of slept.
    pub fn new_for_tests<T>(config: &RelayConfig, transport: Arc<T>) -> Self
    where
        T: UpstreamTransport + 'static,
    {
        let metrics = Arc::new(AppMetrics::new());
        let client = InferenceClient::new(
            transport,
            config.retry.clone(),
            config.generation.clone(),
            ResponseNormalizer::new(config.prompt_format),
        )
        .with_sleeper(Arc::new(RecordingSleeper::default()))
        .with_metrics(metrics.clone());
        let chat = ChatService::new(config.token.clone(), client, config.prompt_format)
            .with_metrics(metrics.clone());
        Self {
            chat: Arc::new(chat),
            metrics,
        }
    }
}
