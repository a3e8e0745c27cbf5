pub mod metrics;
pub mod signal;
mod error;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use event_api::{DEFAULT_LIMIT, DEFAULT_PAGE, EventQuery, EventReader};

pub use error::ApiServerError;

/// Serve `app` on `0.0.0.0:port` until `shutdown` is cancelled.
pub async fn serve(port: u16, app: Router, shutdown: CancellationToken) -> Result<(), ApiServerError> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|source| ApiServerError::Bind { port, source })?;

    tracing::info!(port, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ApiServerError::Serve)
}

// ═══════════════════════════════════════════════════════════════
//  /metrics + /health
// ═══════════════════════════════════════════════════════════════

pub fn health_router(prometheus: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/health", get(handle_health))
        .with_state(Arc::new(crate::metrics::Scrape::new(prometheus)))
}

async fn handle_metrics(State(scrape): State<Arc<crate::metrics::Scrape>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        scrape.render(),
    )
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ═══════════════════════════════════════════════════════════════
//  Read API: GET /events
// ═══════════════════════════════════════════════════════════════

/// `/events` plus `/metrics` and `/health`, all instrumented.
pub fn api_router(reader: Arc<dyn EventReader>, prometheus: PrometheusHandle) -> Router {
    Router::new()
        .route("/events", get(handle_list_events))
        .with_state(reader)
        .merge(health_router(prometheus))
        .layer(axum::middleware::from_fn(crate::metrics::track_requests))
}

/// `GET /events?eventType=&startTime=&endTime=&page=&limit=`
///
/// `page` / `limit` that are missing, unparsable or not positive fall
/// back to 1 / 10.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsParams {
    event_type: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

impl EventsParams {
    fn into_query(self) -> EventQuery {
        EventQuery {
            event_type: non_empty(self.event_type),
            start_time: non_empty(self.start_time),
            end_time: non_empty(self.end_time),
            page: positive_or(self.page.as_deref(), DEFAULT_PAGE),
            limit: positive_or(self.limit.as_deref(), DEFAULT_LIMIT),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

async fn handle_list_events(
    State(reader): State<Arc<dyn EventReader>>,
    Query(params): Query<EventsParams>,
) -> Response {
    let query = params.into_query();
    match reader.find(&query).await {
        Ok(events) => Json(events).into_response(),
        Err(e) => {
            tracing::error!(error = ?e, ?query, "events query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal Server Error" })),
            )
                .into_response()
        }
    }
}
