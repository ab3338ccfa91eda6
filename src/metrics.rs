use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::http::AppState;

const LABELS: &[&str] = &["method", "path", "status"];

pub struct Metrics {
    registry: Registry,
    request_count: IntCounterVec,
    response_time: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let request_count = IntCounterVec::new(
            Opts::new("http_requests_total", "Number of handled HTTP requests"),
            LABELS,
        )?;
        let response_time = HistogramVec::new(
            HistogramOpts::new("http_response_time_seconds", "HTTP response latency"),
            LABELS,
        )?;

        registry
            .register(Box::new(request_count.clone()))
            .context("failed to register request counter")?;
        registry
            .register(Box::new(response_time.clone()))
            .context("failed to register response histogram")?;

        Ok(Self {
            registry,
            request_count,
            response_time,
        })
    }

    pub fn observe(&self, method: &str, path: &str, status: u16, latency: f64) {
        let status = status.to_string();
        let labels = [method, path, status.as_str()];

        self.request_count.with_label_values(&labels).inc();
        self.response_time
            .with_label_values(&labels)
            .observe(latency);
    }

    /// Prometheus text exposition of everything registered.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context("failed to encode metrics")?;
        String::from_utf8(buf).context("metrics output is not UTF-8")
    }
}

pub async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = match req.extensions().get::<MatchedPath>() {
        Some(matched_path) => matched_path.as_str().to_owned(),
        None => req.uri().path().to_owned(),
    };
    let method = req.method().to_string();

    let start = Instant::now();
    let response = next.run(req).await;
    let latency = start.elapsed().as_secs_f64();

    state
        .metrics
        .observe(&method, &path, response.status().as_u16(), latency);

    response
}
