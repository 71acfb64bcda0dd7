use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SubscriptionTier, VideoJob};

pub const DEFAULT_MONTHLY_LIMIT: u32 = 30;

/// Settings key holding the pro-tier monthly allowance.
pub const MONTHLY_LIMIT_SETTING: &str = "monthly_video_limit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub monthly_limit: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
        }
    }
}

impl QuotaPolicy {
    /// Builds the policy from the raw settings value. Missing, non-numeric
    /// and non-positive values all resolve to the default.
    pub fn from_setting(value: Option<&serde_json::Value>) -> Self {
        let parsed = value.and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        });

        match parsed {
            Some(limit) if limit > 0 => Self {
                monthly_limit: u32::try_from(limit).unwrap_or(u32::MAX),
            },
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProQuota {
    pub can_generate: bool,
    pub used: i64,
    pub remaining: i64,
    pub limit: i64,
    pub resets_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProQuotaOutcome {
    /// The account is not on the pro tier (or has no profile); the caller
    /// must consult the free-credit balance instead.
    NotApplicable,
    Evaluated(ProQuota),
}

impl ProQuotaOutcome {
    pub fn can_generate(&self) -> bool {
        match self {
            ProQuotaOutcome::NotApplicable => false,
            ProQuotaOutcome::Evaluated(quota) => quota.can_generate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    UnknownAccount,
    NoCreditsRemaining,
    MonthlyLimitReached {
        used: i64,
        limit: i64,
        resets_at: DateTime<Utc>,
    },
}

impl DenialReason {
    pub fn message(&self) -> String {
        match self {
            DenialReason::UnknownAccount => "No account profile for this user".to_string(),
            DenialReason::NoCreditsRemaining => "No video credits remaining".to_string(),
            DenialReason::MonthlyLimitReached { used, limit, resets_at } => format!(
                "Monthly video limit of {} reached (used: {}), resets at {}",
                limit,
                used,
                resets_at.to_rfc3339()
            ),
        }
    }
}

/// Result of an admission attempt, with the tier the ledger decided under.
/// Users without a profile are reported as free.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted { job: VideoJob, tier: SubscriptionTier },
    Denied { reason: DenialReason, tier: SubscriptionTier },
}

impl Admission {
    pub fn tier(&self) -> SubscriptionTier {
        match self {
            Admission::Admitted { tier, .. } | Admission::Denied { tier, .. } => *tier,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuotaStatusResponse {
    pub tier: SubscriptionTier,
    pub can_generate: bool,
    /// Present for free-tier accounts only.
    pub credits_remaining: Option<i32>,
    pub pro: ProQuotaOutcome,
}

#[derive(Debug, Deserialize)]
pub struct QuotaPolicyRequest {
    pub monthly_limit: i64,
}
