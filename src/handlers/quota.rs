use axum::{extract::State, response::Json};
use chrono::Utc;
use serde_json::json;

use crate::{
    errors::Result,
    handlers::AppState,
    middleware::ActingUser,
    models::QuotaStatusResponse,
};

pub async fn get_quota_status(
    State(state): State<AppState>,
    user: ActingUser,
) -> Result<Json<QuotaStatusResponse>> {
    let policy = state.policy.current().await;
    let status = state.quota.quota_status(user.id, &policy, Utc::now()).await?;
    Ok(Json(status))
}

pub async fn can_generate(
    State(state): State<AppState>,
    user: ActingUser,
) -> Result<Json<serde_json::Value>> {
    let policy = state.policy.current().await;
    let allowed = state.quota.can_generate_video(user.id, &policy, Utc::now()).await?;

    Ok(Json(json!({
        "can_generate": allowed
    })))
}
