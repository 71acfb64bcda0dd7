use axum::{extract::State, http::StatusCode, response::Json};

use crate::{
    errors::Result,
    handlers::AppState,
    middleware::ActingUser,
    models::{DeletedAccount, UserAccount},
};

pub async fn provision_account(
    State(state): State<AppState>,
    user: ActingUser,
) -> Result<(StatusCode, Json<UserAccount>)> {
    let account = state.accounts.provision(user.id).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(state): State<AppState>,
    user: ActingUser,
) -> Result<Json<UserAccount>> {
    let account = state.accounts.find(user.id).await?;
    Ok(Json(account))
}

pub async fn delete_account(
    State(state): State<AppState>,
    user: ActingUser,
) -> Result<Json<DeletedAccount>> {
    let deleted = state.accounts.delete(user.id).await?;
    Ok(Json(deleted))
}
