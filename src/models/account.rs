use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile row. `credits_remaining` only matters while the account is on
/// the free tier.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub subscription_tier: SubscriptionTier,
    pub credits_remaining: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new_free(id: Uuid, credits: i32) -> Self {
        let now = Utc::now();
        Self {
            id,
            subscription_tier: SubscriptionTier::Free,
            credits_remaining: credits.max(0),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pro(&self) -> bool {
        self.subscription_tier == SubscriptionTier::Pro
    }
}

#[derive(Debug, Deserialize)]
pub struct SetTierRequest {
    pub tier: SubscriptionTier,
}

#[derive(Debug, Serialize)]
pub struct DeletedAccount {
    pub user_id: Uuid,
    pub jobs_removed: u64,
    pub account_removed: bool,
}

impl DeletedAccount {
    pub fn is_empty(&self) -> bool {
        !self.account_removed && self.jobs_removed == 0
    }
}
