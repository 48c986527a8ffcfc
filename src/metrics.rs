use std::time::Duration;

use prometheus::{
    opts, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct AppMetrics {
    registry: Registry,
    request_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    inflight_requests: IntGauge,
    upstream_attempts_total: IntCounterVec,
    chat_errors_total: IntCounterVec,
}

pub struct InflightGuard<'a> {
    metrics: &'a AppMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_total = IntCounterVec::new(
            opts!(
                "relay_http_requests_total",
                "Total HTTP requests processed by the chat relay"
            ),
            &["path", "method", "status"],
        )
        .expect("valid request_total metric");

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relay_http_request_duration_seconds",
                "HTTP request latency in seconds, upstream retries included",
            ),
            &["path", "method"],
        )
        .expect("valid request_duration_seconds metric");

        let inflight_requests = IntGauge::new(
            "relay_inflight_requests",
            "Current in-flight chat requests",
        )
        .expect("valid inflight_requests metric");

        let upstream_attempts_total = IntCounterVec::new(
            opts!(
                "relay_upstream_attempts_total",
                "Upstream inference attempts by outcome"
            ),
            &["outcome"],
        )
        .expect("valid upstream_attempts_total metric");

        let chat_errors_total = IntCounterVec::new(
            opts!(
                "relay_chat_errors_total",
                "Chat requests that ended in an error envelope, by kind"
            ),
            &["kind"],
        )
        .expect("valid chat_errors_total metric");

        registry
            .register(Box::new(request_total.clone()))
            .expect("register request_total");
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .expect("register request_duration_seconds");
        registry
            .register(Box::new(inflight_requests.clone()))
            .expect("register inflight_requests");
        registry
            .register(Box::new(upstream_attempts_total.clone()))
            .expect("register upstream_attempts_total");
        registry
            .register(Box::new(chat_errors_total.clone()))
            .expect("register chat_errors_total");

        Self {
            registry,
            request_total,
            request_duration_seconds,
            inflight_requests,
            upstream_attempts_total,
            chat_errors_total,
        }
    }

    pub fn inflight_guard(&self) -> InflightGuard<'_> {
        self.inflight_requests.inc();
        InflightGuard { metrics: self }
    }

    pub fn observe_request(&self, path: &str, method: &str, status: u16, duration: Duration) {
        let status_label = status.to_string();
        self.request_total
            .with_label_values(&[path, method, &status_label])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[path, method])
            .observe(duration.as_secs_f64());
    }

    pub fn observe_attempt(&self, outcome: &str) {
        self.upstream_attempts_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn observe_chat_error(&self, kind: &str) {
        self.chat_errors_total.with_label_values(&[kind]).inc();
    }

    pub fn render(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|error| error.to_string())?;
        String::from_utf8(buffer).map_err(|error| error.to_string())
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.inflight_requests.dec();
    }
}
