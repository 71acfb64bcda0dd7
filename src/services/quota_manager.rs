use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    database::Ledger,
    errors::Result,
    models::{Admission, ProQuota, ProQuotaOutcome, QuotaPolicy, QuotaStatusResponse, SubscriptionTier, UserAccount},
    services::{
        metrics::MetricsService,
        quota_evaluator::{evaluate_pro, free_tier_allows, MonthWindow},
    },
};

/// Read-side quota checks and the admission gate. Every method takes the
/// acting user and the policy explicitly.
#[derive(Clone)]
pub struct QuotaManager {
    ledger: Arc<dyn Ledger>,
    metrics: Arc<MetricsService>,
}

impl QuotaManager {
    pub fn new(ledger: Arc<dyn Ledger>, metrics: Arc<MetricsService>) -> Self {
        Self { ledger, metrics }
    }

    pub async fn count_monthly_usage(&self, user_id: Uuid, reference: DateTime<Utc>) -> Result<i64> {
        let window = MonthWindow::containing(reference);
        let used = self.ledger.count_consuming_jobs(user_id, window).await?;
        Ok(used.max(0))
    }

    pub async fn evaluate_pro_quota(
        &self,
        user_id: Uuid,
        policy: &QuotaPolicy,
        reference: DateTime<Utc>,
    ) -> Result<ProQuotaOutcome> {
        let account = self.ledger.find_account(user_id).await?;
        match account {
            Some(account) if account.is_pro() => Ok(ProQuotaOutcome::Evaluated(
                self.pro_quota(&account, policy, reference).await?,
            )),
            _ => Ok(ProQuotaOutcome::NotApplicable),
        }
    }

    /// Advisory check for display. Admission re-checks atomically.
    pub async fn can_generate_video(
        &self,
        user_id: Uuid,
        policy: &QuotaPolicy,
        reference: DateTime<Utc>,
    ) -> Result<bool> {
        let account = self.ledger.find_account(user_id).await?;
        let allowed = match &account {
            Some(account) if account.is_pro() => self.pro_quota(account, policy, reference).await?.can_generate,
            other => free_tier_allows(other.as_ref()),
        };

        let tier = account.map(|a| a.subscription_tier).unwrap_or(SubscriptionTier::Free);
        tracing::debug!(%user_id, %tier, allowed, "Evaluated video generation permission");
        Ok(allowed)
    }

    pub async fn decrement_credits(&self, user_id: Uuid) -> Result<bool> {
        let taken = self.ledger.decrement_credits(user_id).await?;
        if taken {
            self.metrics.record_credit_consumed();
            tracing::debug!(%user_id, "Consumed one video credit");
        } else {
            tracing::debug!(%user_id, "Credit decrement skipped by guard");
        }
        Ok(taken)
    }

    pub async fn quota_status(
        &self,
        user_id: Uuid,
        policy: &QuotaPolicy,
        reference: DateTime<Utc>,
    ) -> Result<QuotaStatusResponse> {
        let account = self.ledger.find_account(user_id).await?;

        let response = match &account {
            Some(account) if account.is_pro() => {
                let quota = self.pro_quota(account, policy, reference).await?;
                QuotaStatusResponse {
                    tier: SubscriptionTier::Pro,
                    can_generate: quota.can_generate,
                    credits_remaining: None,
                    pro: ProQuotaOutcome::Evaluated(quota),
                }
            }
            other => QuotaStatusResponse {
                tier: SubscriptionTier::Free,
                can_generate: free_tier_allows(other.as_ref()),
                credits_remaining: Some(other.as_ref().map(|a| a.credits_remaining).unwrap_or(0)),
                pro: ProQuotaOutcome::NotApplicable,
            },
        };

        Ok(response)
    }

    /// The tier used for metrics and logs is the one the ledger decided under.
    pub async fn admit_job(
        &self,
        user_id: Uuid,
        prompt: Option<String>,
        policy: QuotaPolicy,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let admission = self.ledger.admit_job(user_id, prompt, policy, now).await?;
        match &admission {
            Admission::Admitted { job, tier } => {
                self.metrics.record_decision(tier.as_str(), true);
                self.metrics.record_job_status(job.status.as_str());
                if *tier == SubscriptionTier::Free {
                    self.metrics.record_credit_consumed();
                }
                tracing::info!(%user_id, job_id = %job.id, %tier, "Admitted video job");
            }
            Admission::Denied { reason, tier } => {
                self.metrics.record_decision(tier.as_str(), false);
                tracing::info!(%user_id, %tier, reason = %reason.message(), "Denied video job");
            }
        }

        Ok(admission)
    }

    async fn pro_quota(
        &self,
        account: &UserAccount,
        policy: &QuotaPolicy,
        reference: DateTime<Utc>,
    ) -> Result<ProQuota> {
        let used = self.count_monthly_usage(account.id, reference).await?;
        Ok(evaluate_pro(used, policy, reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryLedger;
    use crate::models::{DeletedAccount, JobStatus, VideoJob};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    async fn setup() -> (Arc<MemoryLedger>, QuotaManager) {
        let ledger = Arc::new(MemoryLedger::new());
        let metrics = Arc::new(MetricsService::new().unwrap());
        let manager = QuotaManager::new(ledger.clone(), metrics);
        (ledger, manager)
    }

    async fn pro_user(ledger: &MemoryLedger) -> Uuid {
        let id = Uuid::new_v4();
        let mut account = UserAccount::new_free(id, 7);
        account.subscription_tier = SubscriptionTier::Pro;
        ledger.insert_account(account).await;
        id
    }

    async fn seed_jobs(ledger: &MemoryLedger, user_id: Uuid, status: JobStatus, n: usize, created_at: DateTime<Utc>) {
        for _ in 0..n {
            let mut job = VideoJob::pending(user_id, None, created_at);
            job.status = status;
            ledger.insert_job(job).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_pending_job_fills_last_slot() {
        let (ledger, manager) = setup().await;
        let user = pro_user(&ledger).await;
        let now = at(2024, 6, 15, 9);
        seed_jobs(&ledger, user, JobStatus::Completed, 29, at(2024, 6, 2, 10)).await;
        seed_jobs(&ledger, user, JobStatus::Pending, 1, at(2024, 6, 14, 10)).await;

        let policy = QuotaPolicy { monthly_limit: 30 };
        let outcome = manager.evaluate_pro_quota(user, &policy, now).await.unwrap();

        let ProQuotaOutcome::Evaluated(quota) = outcome else {
            panic!("expected an evaluated quota");
        };
        assert_eq!(quota.used, 30);
        assert_eq!(quota.remaining, 0);
        assert!(!quota.can_generate);
        assert!(!manager.can_generate_video(user, &policy, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_jobs_do_not_count() {
        let (ledger, manager) = setup().await;
        let user = pro_user(&ledger).await;
        let now = at(2024, 6, 15, 9);
        seed_jobs(&ledger, user, JobStatus::Completed, 5, at(2024, 6, 3, 10)).await;
        seed_jobs(&ledger, user, JobStatus::Failed, 3, at(2024, 6, 4, 10)).await;

        let outcome = manager
            .evaluate_pro_quota(user, &QuotaPolicy::default(), now)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProQuotaOutcome::Evaluated(crate::models::ProQuota {
                can_generate: true,
                used: 5,
                remaining: 25,
                limit: 30,
                resets_at: at(2024, 7, 1, 0),
            })
        );
    }

    #[tokio::test]
    async fn test_month_boundaries() {
        let (ledger, manager) = setup().await;
        let user = pro_user(&ledger).await;
        let month_start = at(2024, 6, 1, 0);
        let month_end = at(2024, 7, 1, 0);
        seed_jobs(&ledger, user, JobStatus::Completed, 1, month_start).await;
        seed_jobs(&ledger, user, JobStatus::Completed, 1, month_end).await;
        seed_jobs(&ledger, user, JobStatus::Completed, 1, month_start - chrono::Duration::seconds(1)).await;

        assert_eq!(manager.count_monthly_usage(user, at(2024, 6, 20, 0)).await.unwrap(), 1);
        assert_eq!(manager.count_monthly_usage(user, month_end).await.unwrap(), 1);
        assert_eq!(manager.count_monthly_usage(user, at(2024, 5, 31, 23)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent() {
        let (ledger, manager) = setup().await;
        let user = pro_user(&ledger).await;
        let now = at(2024, 6, 15, 9);
        seed_jobs(&ledger, user, JobStatus::Processing, 4, at(2024, 6, 10, 10)).await;

        let policy = QuotaPolicy::default();
        let first = manager.evaluate_pro_quota(user, &policy, now).await.unwrap();
        let second = manager.evaluate_pro_quota(user, &policy, now).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_free_and_unknown_users_are_not_applicable() {
        let (ledger, manager) = setup().await;
        let free = Uuid::new_v4();
        ledger.provision_account(free, 3).await.unwrap();
        let now = at(2024, 6, 15, 9);
        let policy = QuotaPolicy::default();

        assert_eq!(
            manager.evaluate_pro_quota(free, &policy, now).await.unwrap(),
            ProQuotaOutcome::NotApplicable
        );
        assert_eq!(
            manager.evaluate_pro_quota(Uuid::new_v4(), &policy, now).await.unwrap(),
            ProQuotaOutcome::NotApplicable
        );
        assert!(!manager.can_generate_video(Uuid::new_v4(), &policy, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_pro_account_ignores_credit_field() {
        let (ledger, manager) = setup().await;
        let user = pro_user(&ledger).await;

        assert!(!manager.decrement_credits(user).await.unwrap());
        let account = ledger.find_account(user).await.unwrap().unwrap();
        assert_eq!(account.credits_remaining, 7);
    }

    #[tokio::test]
    async fn test_free_credit_cycle() {
        let (ledger, manager) = setup().await;
        let user = Uuid::new_v4();
        ledger.provision_account(user, 3).await.unwrap();
        let now = at(2024, 6, 15, 9);
        let policy = QuotaPolicy::default();

        for _ in 0..3 {
            assert!(manager.can_generate_video(user, &policy, now).await.unwrap());
            let admission = manager.admit_job(user, None, policy, now).await.unwrap();
            assert!(matches!(admission, Admission::Admitted { .. }));
        }

        let account = ledger.find_account(user).await.unwrap().unwrap();
        assert_eq!(account.credits_remaining, 0);
        assert!(!manager.can_generate_video(user, &policy, now).await.unwrap());
        assert!(!manager.decrement_credits(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_quota_status_shapes() {
        let (ledger, manager) = setup().await;
        let free = Uuid::new_v4();
        ledger.provision_account(free, 2).await.unwrap();
        let pro = pro_user(&ledger).await;
        let now = at(2024, 6, 15, 9);
        let policy = QuotaPolicy::default();

        let free_status = manager.quota_status(free, &policy, now).await.unwrap();
        assert_eq!(free_status.credits_remaining, Some(2));
        assert!(free_status.can_generate);
        assert_eq!(free_status.pro, ProQuotaOutcome::NotApplicable);

        let pro_status = manager.quota_status(pro, &policy, now).await.unwrap();
        assert_eq!(pro_status.credits_remaining, None);
        assert!(matches!(pro_status.pro, ProQuotaOutcome::Evaluated(_)));

        let unknown = manager.quota_status(Uuid::new_v4(), &policy, now).await.unwrap();
        assert_eq!(unknown.tier, SubscriptionTier::Free);
        assert_eq!(unknown.credits_remaining, Some(0));
        assert!(!unknown.can_generate);
    }

    /// Downgrades the account to free right after every profile read, so a
    /// second read in the same call would see a different tier.
    struct DowngradingLedger {
        inner: MemoryLedger,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl Ledger for DowngradingLedger {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }

        async fn find_account(&self, user_id: Uuid) -> Result<Option<UserAccount>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let account = self.inner.find_account(user_id).await?;
            self.inner.set_subscription_tier(user_id, SubscriptionTier::Free).await?;
            Ok(account)
        }

        async fn provision_account(&self, user_id: Uuid, initial_credits: i32) -> Result<UserAccount> {
            self.inner.provision_account(user_id, initial_credits).await
        }

        async fn set_subscription_tier(
            &self,
            user_id: Uuid,
            tier: SubscriptionTier,
        ) -> Result<Option<UserAccount>> {
            self.inner.set_subscription_tier(user_id, tier).await
        }

        async fn count_consuming_jobs(&self, user_id: Uuid, window: MonthWindow) -> Result<i64> {
            self.inner.count_consuming_jobs(user_id, window).await
        }

        async fn decrement_credits(&self, user_id: Uuid) -> Result<bool> {
            self.inner.decrement_credits(user_id).await
        }

        async fn admit_job(
            &self,
            user_id: Uuid,
            prompt: Option<String>,
            policy: QuotaPolicy,
            now: DateTime<Utc>,
        ) -> Result<Admission> {
            self.inner.admit_job(user_id, prompt, policy, now).await
        }

        async fn find_job(&self, job_id: Uuid) -> Result<Option<VideoJob>> {
            self.inner.find_job(job_id).await
        }

        async fn list_jobs(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<VideoJob>> {
            self.inner.list_jobs(user_id, limit, offset).await
        }

        async fn update_job_status(
            &self,
            job_id: Uuid,
            status: JobStatus,
            video_path: Option<String>,
        ) -> Result<VideoJob> {
            self.inner.update_job_status(job_id, status, video_path).await
        }

        async fn delete_account(&self, user_id: Uuid) -> Result<DeletedAccount> {
            self.inner.delete_account(user_id).await
        }

        async fn load_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
            self.inner.load_setting(key).await
        }

        async fn store_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
            self.inner.store_setting(key, value).await
        }
    }

    async fn downgrading_setup() -> (Arc<DowngradingLedger>, Arc<MetricsService>, QuotaManager, Uuid) {
        let ledger = Arc::new(DowngradingLedger {
            inner: MemoryLedger::new(),
            reads: AtomicUsize::new(0),
        });
        let user = pro_user(&ledger.inner).await;
        let metrics = Arc::new(MetricsService::new().unwrap());
        let manager = QuotaManager::new(ledger.clone(), metrics.clone());
        (ledger, metrics, manager, user)
    }

    #[tokio::test]
    async fn test_can_generate_reads_the_profile_once() {
        let (ledger, _metrics, manager, user) = downgrading_setup().await;
        let now = at(2024, 6, 15, 9);

        let allowed = manager
            .can_generate_video(user, &QuotaPolicy { monthly_limit: 1 }, now)
            .await
            .unwrap();

        assert!(allowed);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quota_status_is_consistent_with_one_read() {
        let (ledger, _metrics, manager, user) = downgrading_setup().await;
        let now = at(2024, 6, 15, 9);

        let status = manager.quota_status(user, &QuotaPolicy::default(), now).await.unwrap();

        assert_eq!(status.tier, SubscriptionTier::Pro);
        assert_eq!(status.credits_remaining, None);
        assert!(matches!(status.pro, ProQuotaOutcome::Evaluated(_)));
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_admission_metrics_use_the_decided_tier() {
        let (ledger, metrics, manager, user) = downgrading_setup().await;
        let now = at(2024, 6, 15, 9);

        let admission = manager.admit_job(user, None, QuotaPolicy::default(), now).await.unwrap();

        assert!(matches!(admission, Admission::Admitted { .. }));
        assert_eq!(admission.tier(), SubscriptionTier::Pro);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 0);

        let text = metrics.render().unwrap();
        assert!(text.contains("tier=\"pro\""));
        assert!(!text.contains("tier=\"free\""));
        assert!(!text.contains("credits_consumed_total 1"));
    }
}
