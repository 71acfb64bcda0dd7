use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    queries::{JobQueries, ProfileQueries, SettingsQueries},
    Database, Ledger,
};
use crate::errors::{AppError, Result};
use crate::models::*;
use crate::services::quota_evaluator::{decide_admission, AdmissionDecision, MonthWindow};

#[async_trait]
impl Ledger for Database {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }

    async fn find_account(&self, user_id: Uuid) -> Result<Option<UserAccount>> {
        ProfileQueries::find_by_id(self.pool(), user_id).await
    }

    async fn provision_account(&self, user_id: Uuid, initial_credits: i32) -> Result<UserAccount> {
        let mut tx = self.pool().begin().await?;
        ProfileQueries::insert_free(&mut *tx, user_id, initial_credits).await?;
        let account = ProfileQueries::find_by_id(&mut *tx, user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        tx.commit().await?;

        Ok(account)
    }

    async fn set_subscription_tier(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
    ) -> Result<Option<UserAccount>> {
        ProfileQueries::set_tier(self.pool(), user_id, tier).await
    }

    async fn count_consuming_jobs(&self, user_id: Uuid, window: MonthWindow) -> Result<i64> {
        JobQueries::count_consuming(self.pool(), user_id, window).await
    }

    async fn decrement_credits(&self, user_id: Uuid) -> Result<bool> {
        ProfileQueries::decrement_credits(self.pool(), user_id).await
    }

    async fn admit_job(
        &self,
        user_id: Uuid,
        prompt: Option<String>,
        policy: QuotaPolicy,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let mut tx = self.pool().begin().await?;

        // Concurrent admissions for the same user queue on this row lock.
        let account = ProfileQueries::lock_by_id(&mut *tx, user_id).await?;
        let used = match &account {
            Some(account) if account.is_pro() => {
                JobQueries::count_consuming(&mut *tx, user_id, MonthWindow::containing(now)).await?
            }
            _ => 0,
        };

        let tier = account
            .as_ref()
            .map(|a| a.subscription_tier)
            .unwrap_or(SubscriptionTier::Free);
        let job = VideoJob::pending(user_id, prompt, now);
        match decide_admission(account.as_ref(), used, &policy, now) {
            AdmissionDecision::Deny(reason) => {
                tx.rollback().await?;
                Ok(Admission::Denied { reason, tier })
            }
            AdmissionDecision::WithinMonthlyQuota => {
                let job = JobQueries::insert(&mut *tx, &job).await?;
                tx.commit().await?;
                Ok(Admission::Admitted { job, tier })
            }
            AdmissionDecision::ConsumeCredit => {
                let job = JobQueries::insert(&mut *tx, &job).await?;
                if !ProfileQueries::decrement_credits(&mut *tx, user_id).await? {
                    tx.rollback().await?;
                    return Ok(Admission::Denied {
                        reason: DenialReason::NoCreditsRemaining,
                        tier,
                    });
                }
                tx.commit().await?;
                Ok(Admission::Admitted { job, tier })
            }
        }
    }

    async fn find_job(&self, job_id: Uuid) -> Result<Option<VideoJob>> {
        JobQueries::find_by_id(self.pool(), job_id).await
    }

    async fn list_jobs(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<VideoJob>> {
        JobQueries::list_by_user(self.pool(), user_id, limit, offset).await
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        video_path: Option<String>,
    ) -> Result<VideoJob> {
        let mut tx = self.pool().begin().await?;
        let current = JobQueries::lock_by_id(&mut *tx, job_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if !current.status.can_transition_to(status) {
            tx.rollback().await?;
            return Err(AppError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let job = JobQueries::update_status(&mut *tx, job_id, status, video_path.as_deref(), Utc::now()).await?;
        tx.commit().await?;

        Ok(job)
    }

    async fn delete_account(&self, user_id: Uuid) -> Result<DeletedAccount> {
        let mut tx = self.pool().begin().await?;
        // Lock first so no admission can slip a job in between the two deletes.
        ProfileQueries::lock_by_id(&mut *tx, user_id).await?;
        let jobs_removed = JobQueries::delete_by_user(&mut *tx, user_id).await?;
        let account_removed = ProfileQueries::delete(&mut *tx, user_id).await?;
        tx.commit().await?;

        Ok(DeletedAccount {
            user_id,
            jobs_removed,
            account_removed,
        })
    }

    async fn load_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        SettingsQueries::get(self.pool(), key).await
    }

    async fn store_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        SettingsQueries::put(self.pool(), key, &value).await
    }
}
