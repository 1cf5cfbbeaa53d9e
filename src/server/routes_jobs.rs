//! Job poll and cancel routes.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use reelhunt_common::{Error, JobId};
use serde::Serialize;

use super::error::AppError;
use super::AppContext;
use crate::jobs::JobPoll;

pub fn job_routes() -> Router<AppContext> {
    Router::new()
        .route("/jobs/:job_id", get(get_job).delete(cancel_job))
        .route("/jobs/:job_id/cancel", post(cancel_job))
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    cancelled: bool,
}

fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse()
        .map_err(|_| AppError(Error::invalid_request(format!("invalid job id: {}", raw))))
}

/// GET /api/jobs/:job_id
async fn get_job(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> Result<Json<JobPoll>, AppError> {
    let id = parse_job_id(&job_id)?;
    let job = ctx.resolver.jobs().get(id)?;
    Ok(Json(job.into()))
}

/// DELETE /api/jobs/:job_id, POST /api/jobs/:job_id/cancel
///
/// Always 200; `cancelled` says whether a running job was stopped.
async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let id = parse_job_id(&job_id)?;
    let cancelled = ctx.resolver.jobs().cancel(id);
    Ok(Json(CancelResponse { cancelled }))
}
