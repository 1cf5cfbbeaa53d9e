//! Bandwidth test, report and status routes.

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::error::AppError;
use super::AppContext;
use crate::bandwidth::test_stream::{clamp_duration, test_stream};
use crate::bandwidth::{BandwidthReport, BandwidthStatus, ReportOutcome, DEFAULT_USER_ID};
use crate::playback::client::USER_ID_HEADER;

pub fn bandwidth_routes() -> Router<AppContext> {
    Router::new()
        .route("/bandwidth/test", get(bandwidth_test))
        .route("/bandwidth/report", post(report))
        .route("/bandwidth/status", get(status))
}

fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_USER_ID)
        .to_string()
}

#[derive(Debug, Deserialize)]
struct TestParams {
    duration: Option<u64>,
}

/// GET /api/bandwidth/test?duration=N
async fn bandwidth_test(
    params: Result<Query<TestParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let duration = clamp_duration(params.duration);
    tracing::debug!(duration_secs = duration.as_secs(), "Serving bandwidth test stream");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Body::from_stream(test_stream(duration)),
    )
        .into_response())
}

/// POST /api/bandwidth/report
async fn report(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Result<Json<BandwidthReport>, JsonRejection>,
) -> Result<Json<ReportOutcome>, AppError> {
    let Json(report) = body?;
    Ok(Json(ctx.bandwidth.record(&user_id(&headers), &report)))
}

/// GET /api/bandwidth/status
async fn status(State(ctx): State<AppContext>, headers: HeaderMap) -> impl IntoResponse {
    let status: BandwidthStatus = ctx.bandwidth.status(&user_id(&headers));
    Json(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_id_defaults() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_id(&headers), DEFAULT_USER_ID);
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(user_id(&headers), DEFAULT_USER_ID);
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("alice"));
        assert_eq!(user_id(&headers), "alice");
    }
}
