//! Fallback route.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use super::error::AppError;
use super::AppContext;
use crate::resolver::{FallbackRequest, FallbackResponse};

pub fn fallback_routes() -> Router<AppContext> {
    Router::new().route("/fallback", post(fallback))
}

/// POST /api/fallback
///
/// `{streamUrl: null}` when no lower-bitrate alternate exists.
async fn fallback(
    State(ctx): State<AppContext>,
    body: Result<Json<FallbackRequest>, JsonRejection>,
) -> Result<Json<FallbackResponse>, AppError> {
    let Json(request) = body?;
    let alternate = ctx.resolver.resolve_alternate(request).await?;
    Ok(Json(alternate.into()))
}
