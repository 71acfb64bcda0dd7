use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::Result,
    handlers::AppState,
    middleware::Operator,
    models::{QuotaPolicy, QuotaPolicyRequest, SetTierRequest, UpdateJobStatusRequest, UserAccount, VideoJob},
};

pub async fn update_job_status(
    State(state): State<AppState>,
    _operator: Operator,
    Path(job_id): Path<Uuid>,
    Json(request): Json<UpdateJobStatusRequest>,
) -> Result<Json<VideoJob>> {
    let job = state
        .ledger
        .update_job_status(job_id, request.status, request.video_path)
        .await?;

    state.metrics.record_job_status(job.status.as_str());
    tracing::info!(%job_id, status = %job.status, "Updated video job status");

    Ok(Json(job))
}

pub async fn decrement_credits(
    State(state): State<AppState>,
    _operator: Operator,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let decremented = state.quota.decrement_credits(user_id).await?;

    Ok(Json(json!({
        "user_id": user_id,
        "decremented": decremented
    })))
}

pub async fn set_tier(
    State(state): State<AppState>,
    _operator: Operator,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetTierRequest>,
) -> Result<Json<UserAccount>> {
    let account = state.accounts.set_tier(user_id, request.tier).await?;
    Ok(Json(account))
}

pub async fn get_quota_policy(
    State(state): State<AppState>,
    _operator: Operator,
) -> Result<Json<QuotaPolicy>> {
    Ok(Json(state.policy.current().await))
}

pub async fn set_quota_policy(
    State(state): State<AppState>,
    _operator: Operator,
    Json(request): Json<QuotaPolicyRequest>,
) -> Result<Json<QuotaPolicy>> {
    let policy = state
        .policy
        .update(state.ledger.as_ref(), request.monthly_limit)
        .await?;
    Ok(Json(policy))
}

pub async fn reload_quota_policy(
    State(state): State<AppState>,
    _operator: Operator,
) -> Result<Json<QuotaPolicy>> {
    let policy = state.policy.reload(state.ledger.as_ref()).await?;
    Ok(Json(policy))
}
