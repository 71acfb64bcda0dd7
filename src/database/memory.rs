//! In-process ledger.
//!
//! Every operation runs under one mutex, which gives the same per-user
//! serialization the Postgres backend gets from row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Ledger;
use crate::errors::{AppError, Result};
use crate::models::*;
use crate::services::quota_evaluator::{decide_admission, AdmissionDecision, MonthWindow};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, UserAccount>,
    jobs: HashMap<Uuid, VideoJob>,
    settings: HashMap<String, serde_json::Value>,
}

impl MemoryState {
    fn count_consuming(&self, user_id: Uuid, window: MonthWindow) -> i64 {
        self.jobs
            .values()
            .filter(|job| job.user_id == user_id)
            .filter(|job| job.status.is_consuming())
            .filter(|job| window.contains(job.created_at))
            .count() as i64
    }

    fn decrement(&mut self, user_id: Uuid) -> bool {
        match self.accounts.get_mut(&user_id) {
            Some(account)
                if account.subscription_tier == SubscriptionTier::Free && account.credits_remaining > 0 =>
            {
                account.credits_remaining -= 1;
                account.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the ledger with an account in any tier.
    pub async fn insert_account(&self, account: UserAccount) {
        self.state.lock().await.accounts.insert(account.id, account);
    }

    /// Records a job as-is, bypassing admission. Used to seed history.
    pub async fn insert_job(&self, job: VideoJob) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&job.user_id) {
            return Err(AppError::Validation(format!("Unknown account {}", job.user_id)));
        }
        state.jobs.insert(job.id, job);
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_account(&self, user_id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.state.lock().await.accounts.get(&user_id).cloned())
    }

    async fn provision_account(&self, user_id: Uuid, initial_credits: i32) -> Result<UserAccount> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .entry(user_id)
            .or_insert_with(|| UserAccount::new_free(user_id, initial_credits));
        Ok(account.clone())
    }

    async fn set_subscription_tier(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
    ) -> Result<Option<UserAccount>> {
        let mut state = self.state.lock().await;
        Ok(state.accounts.get_mut(&user_id).map(|account| {
            account.subscription_tier = tier;
            account.updated_at = Utc::now();
            account.clone()
        }))
    }

    async fn count_consuming_jobs(&self, user_id: Uuid, window: MonthWindow) -> Result<i64> {
        Ok(self.state.lock().await.count_consuming(user_id, window))
    }

    async fn decrement_credits(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.decrement(user_id))
    }

    async fn admit_job(
        &self,
        user_id: Uuid,
        prompt: Option<String>,
        policy: QuotaPolicy,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let mut state = self.state.lock().await;
        let account = state.accounts.get(&user_id);
        let used = match account {
            Some(account) if account.is_pro() => state.count_consuming(user_id, MonthWindow::containing(now)),
            _ => 0,
        };

        let tier = account
            .map(|a| a.subscription_tier)
            .unwrap_or(SubscriptionTier::Free);

        match decide_admission(account, used, &policy, now) {
            AdmissionDecision::Deny(reason) => Ok(Admission::Denied { reason, tier }),
            decision => {
                if decision == AdmissionDecision::ConsumeCredit && !state.decrement(user_id) {
                    return Ok(Admission::Denied {
                        reason: DenialReason::NoCreditsRemaining,
                        tier,
                    });
                }
                let job = VideoJob::pending(user_id, prompt, now);
                state.jobs.insert(job.id, job.clone());
                Ok(Admission::Admitted { job, tier })
            }
        }
    }

    async fn find_job(&self, job_id: Uuid) -> Result<Option<VideoJob>> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn list_jobs(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<VideoJob>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<VideoJob> = state
            .jobs
            .values()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        video_path: Option<String>,
    ) -> Result<VideoJob> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&job_id).ok_or(AppError::NotFound)?;

        if !job.status.can_transition_to(status) {
            return Err(AppError::InvalidTransition {
                from: job.status,
                to: status,
            });
        }

        job.status = status;
        if video_path.is_some() {
            job.video_path = video_path;
        }
        job.updated_at = Utc::now();

        Ok(job.clone())
    }

    async fn delete_account(&self, user_id: Uuid) -> Result<DeletedAccount> {
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state.jobs.retain(|_, job| job.user_id != user_id);
        let jobs_removed = (before - state.jobs.len()) as u64;
        let account_removed = state.accounts.remove(&user_id).is_some();

        Ok(DeletedAccount {
            user_id,
            jobs_removed,
            account_removed,
        })
    }

    async fn load_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.state.lock().await.settings.get(key).cloned())
    }

    async fn store_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.state.lock().await.settings.insert(key.to_string(), value);
        Ok(())
    }
}
