//! Pure quota rules shared by every ledger backend.
//!
//! Nothing in here touches storage: callers supply the usage count and the
//! profile they read under whatever isolation their backend provides.

use chrono::{DateTime, Datelike, Days, Months, NaiveTime, Utc};

use crate::models::{DenialReason, ProQuota, QuotaPolicy, SubscriptionTier, UserAccount};

/// Half-open UTC calendar month `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MonthWindow {
    pub fn containing(reference: DateTime<Utc>) -> Self {
        let start = truncate_to_month(reference);
        let end = start
            .checked_add_months(Months::new(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

pub fn truncate_to_month(reference: DateTime<Utc>) -> DateTime<Utc> {
    let first_of_month = reference.date_naive() - Days::new(u64::from(reference.day0()));
    first_of_month.and_time(NaiveTime::MIN).and_utc()
}

/// First instant of the month after `reference`. Shared by every pro user.
pub fn next_reset(reference: DateTime<Utc>) -> DateTime<Utc> {
    MonthWindow::containing(reference).end
}

pub fn evaluate_pro(used: i64, policy: &QuotaPolicy, reference: DateTime<Utc>) -> ProQuota {
    let limit = i64::from(policy.monthly_limit);
    let used = used.max(0);

    ProQuota {
        can_generate: used < limit,
        used,
        remaining: (limit - used).max(0),
        limit,
        resets_at: next_reset(reference),
    }
}

pub fn free_tier_allows(account: Option<&UserAccount>) -> bool {
    match account {
        Some(account) if account.subscription_tier == SubscriptionTier::Free => {
            account.credits_remaining > 0
        }
        Some(_) => false,
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Free tier: admit and take one credit in the same write.
    ConsumeCredit,
    /// Pro tier: admit; the new pending job is itself the usage record.
    WithinMonthlyQuota,
    Deny(DenialReason),
}

/// `used_this_month` is only consulted for pro accounts.
pub fn decide_admission(
    account: Option<&UserAccount>,
    used_this_month: i64,
    policy: &QuotaPolicy,
    reference: DateTime<Utc>,
) -> AdmissionDecision {
    let Some(account) = account else {
        return AdmissionDecision::Deny(DenialReason::UnknownAccount);
    };

    match account.subscription_tier {
        SubscriptionTier::Pro => {
            let quota = evaluate_pro(used_this_month, policy, reference);
            if quota.can_generate {
                AdmissionDecision::WithinMonthlyQuota
            } else {
                AdmissionDecision::Deny(DenialReason::MonthlyLimitReached {
                    used: quota.used,
                    limit: quota.limit,
                    resets_at: quota.resets_at,
                })
            }
        }
        SubscriptionTier::Free => {
            if account.credits_remaining > 0 {
                AdmissionDecision::ConsumeCredit
            } else {
                AdmissionDecision::Deny(DenialReason::NoCreditsRemaining)
            }
        }
    }
}
