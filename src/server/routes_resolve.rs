//! Resolve route.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use super::error::AppError;
use super::AppContext;
use crate::resolver::{ContentRequest, Resolution, ResolveResponse};

pub fn resolve_routes() -> Router<AppContext> {
    Router::new().route("/resolve", post(resolve))
}

/// POST /api/resolve
///
/// 200 with the source on a cache or local hit, 202 with `{jobId}` when a
/// cloud job was started.
async fn resolve(
    State(ctx): State<AppContext>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body?;
    let resolution = ctx.resolver.resolve(request).await?;
    let status = match resolution {
        Resolution::Resolved(_) => StatusCode::OK,
        Resolution::Pending(_) => StatusCode::ACCEPTED,
    };
    Ok((status, Json(ResolveResponse::from(resolution))).into_response())
}
