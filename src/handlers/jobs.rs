use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::ActingUser,
    models::{Admission, CreateJobRequest, ListJobsQuery, VideoJob},
};

const MAX_PAGE_SIZE: i64 = 100;
const MAX_PROMPT_LEN: usize = 4000;

pub async fn create_job(
    State(state): State<AppState>,
    user: ActingUser,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<VideoJob>)> {
    if request.prompt.as_ref().is_some_and(|p| p.len() > MAX_PROMPT_LEN) {
        return Err(AppError::Validation(format!(
            "prompt must be at most {} bytes",
            MAX_PROMPT_LEN
        )));
    }

    let policy = state.policy.current().await;
    match state.quota.admit_job(user.id, request.prompt, policy, Utc::now()).await? {
        Admission::Admitted { job, .. } => Ok((StatusCode::CREATED, Json(job))),
        Admission::Denied { reason, .. } => Err(AppError::QuotaExceeded(reason.message())),
    }
}

pub async fn list_jobs(
    State(state): State<AppState>,
    user: ActingUser,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<VideoJob>>> {
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let jobs = state.ledger.list_jobs(user.id, limit, offset).await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    user: ActingUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<VideoJob>> {
    let job = state
        .ledger
        .find_job(job_id)
        .await?
        .filter(|job| job.user_id == user.id)
        .ok_or(AppError::NotFound)?;

    Ok(Json(job))
}
