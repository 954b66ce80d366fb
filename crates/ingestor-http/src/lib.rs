//! Operational HTTP surface (spec §6): a liveness probe and a
//! Prometheus-format metrics endpoint. Intentionally thin — no auth, no
//! versioned API, no routes beyond these two (spec §1 Non-goals: "no web
//! UI, no REST API for querying indicators").

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use ingestor_pipeline::Metrics;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    metrics: Arc<Metrics>,
}

/// Builds the `/health` + `/metrics` router over a shared [`Metrics`]
/// handle (spec §6).
pub fn router(metrics: Arc<Metrics>) -> Router {
    let state = AppState { metrics };
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    uptime_seconds: f64,
    timestamp: chrono::DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    axum::Json(HealthBody {
        status: "ok",
        uptime_seconds: snapshot.uptime_seconds,
        timestamp: Utc::now(),
    })
}

async fn metrics_text(State(state): State<AppState>) -> Response {
    let snapshot = state.metrics.snapshot();
    let body = format!(
        "# HELP jobs_processed_total Jobs that reached COMPLETED with a file persisted.\n\
# TYPE jobs_processed_total counter\n\
jobs_processed_total {}\n\
# HELP jobs_failed_total Jobs that reached FAILED.\n\
# TYPE jobs_failed_total counter\n\
jobs_failed_total {}\n\
# HELP files_deduplicated_total Jobs short-circuited by remote or content dedup.\n\
# TYPE files_deduplicated_total counter\n\
files_deduplicated_total {}\n\
# HELP indicators_found_total Indicators of compromise recorded across all scans.\n\
# TYPE indicators_found_total counter\n\
indicators_found_total {}\n\
# HELP uptime_seconds Seconds since process start.\n\
# TYPE uptime_seconds gauge\n\
uptime_seconds {}\n",
        snapshot.jobs_processed,
        snapshot.jobs_failed,
        snapshot.files_deduplicated,
        snapshot.indicators_found,
        snapshot.uptime_seconds,
    );

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_ok_and_nonnegative_uptime() {
        let metrics = Arc::new(Metrics::new());
        let app = router(metrics);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["uptime_seconds"].as_f64().unwrap() >= 0.0);
        assert!(parsed["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn metrics_exposes_exact_prometheus_names() {
        let metrics = Arc::new(Metrics::new());
        metrics.increment_processed();
        metrics.increment_failed();
        metrics.increment_deduplicated();
        metrics.add_indicators_found(3);

        let app = router(metrics);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("jobs_processed_total 1"));
        assert!(text.contains("jobs_failed_total 1"));
        assert!(text.contains("files_deduplicated_total 1"));
        assert!(text.contains("indicators_found_total 3"));
        assert!(text.contains("uptime_seconds "));
    }
}
