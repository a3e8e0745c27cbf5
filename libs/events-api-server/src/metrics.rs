//! Prometheus recorder and the HTTP request instrumentation.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use metrics_process::Collector;

use crate::ApiServerError;

pub const REQUEST_DURATION_BUCKETS: [f64; 5] = [0.1, 0.5, 1.0, 2.0, 5.0];

/// Install the process-wide recorder. Call once, before anything emits.
pub fn install_recorder() -> Result<PrometheusHandle, ApiServerError> {
    builder()?
        .install_recorder()
        .map_err(|e| ApiServerError::Metrics(e.to_string()))
}

/// Recorder handle that is not installed globally (tests, embedding).
pub fn detached_handle() -> Result<PrometheusHandle, ApiServerError> {
    Ok(builder()?.build_recorder().handle())
}

fn builder() -> Result<PrometheusBuilder, ApiServerError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("api_request_duration_seconds".into()),
            &REQUEST_DURATION_BUCKETS,
        )
        .map_err(|e| ApiServerError::Metrics(e.to_string()))
}

/// What `/metrics` renders: the recorder contents plus process gauges
/// (CPU, memory, open fds, threads) refreshed on every scrape.
pub struct Scrape {
    prometheus: PrometheusHandle,
    process: Collector,
}

impl Scrape {
    pub fn new(prometheus: PrometheusHandle) -> Self {
        let process = Collector::default();
        process.describe();
        Self { prometheus, process }
    }

    pub fn render(&self) -> String {
        self.process.collect();
        self.prometheus.render()
    }
}

/// axum middleware: request counter + duration histogram labelled by
/// method, route and status.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    counter!(
        "api_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "api_request_duration_seconds",
        "method" => method,
        "route" => route,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());

    response
}
