use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{errors::AppError, handlers::AppState};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Identity of the caller, asserted by the fronting auth gateway.
#[derive(Debug, Clone, Copy)]
pub struct ActingUser {
    pub id: Uuid,
}

/// Operator access for the billing system and job pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Operator;

/// SHA-256 digest of the configured operator secret. Presented tokens are
/// hashed and matched digest to digest.
#[derive(Clone)]
pub struct OperatorToken {
    digest: [u8; 32],
}

impl OperatorToken {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: hash_token(secret),
        }
    }

    pub fn matches(&self, provided: &str) -> bool {
        hash_token(provided) == self.digest
    }
}

fn hash_token(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::Validation(format!("Invalid {} header", USER_ID_HEADER)))?;

        Ok(ActingUser { id })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.operator_token.as_ref() else {
            return Err(AppError::Forbidden);
        };

        let provided = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Forbidden)?;

        if !expected.matches(provided) {
            tracing::warn!("Rejected operator request with bad token");
            return Err(AppError::Forbidden);
        }

        Ok(Operator)
    }
}
