use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{Admission, DeletedAccount, JobStatus, QuotaPolicy, SubscriptionTier, UserAccount, VideoJob};
use crate::services::quota_evaluator::MonthWindow;

pub mod memory;
pub mod postgres;
pub mod queries;

pub use memory::MemoryLedger;

/// Job, profile and settings store behind the quota service.
///
/// `admit_job` and `decrement_credits` must be atomic per user: two
/// concurrent calls can never both consume the same unit of allowance.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn find_account(&self, user_id: Uuid) -> Result<Option<UserAccount>>;

    /// Creates a free-tier profile, or returns the existing one untouched.
    async fn provision_account(&self, user_id: Uuid, initial_credits: i32) -> Result<UserAccount>;

    async fn set_subscription_tier(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
    ) -> Result<Option<UserAccount>>;

    async fn count_consuming_jobs(&self, user_id: Uuid, window: MonthWindow) -> Result<i64>;

    /// Guarded decrement: only free-tier accounts with a positive balance
    /// lose a credit. Returns whether a credit was taken.
    async fn decrement_credits(&self, user_id: Uuid) -> Result<bool>;

    async fn admit_job(
        &self,
        user_id: Uuid,
        prompt: Option<String>,
        policy: QuotaPolicy,
        now: DateTime<Utc>,
    ) -> Result<Admission>;

    async fn find_job(&self, job_id: Uuid) -> Result<Option<VideoJob>>;

    async fn list_jobs(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<VideoJob>>;

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        video_path: Option<String>,
    ) -> Result<VideoJob>;

    /// Removes every job of the user, then the profile, as one unit.
    async fn delete_account(&self, user_id: Uuid) -> Result<DeletedAccount>;

    async fn load_setting(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn store_setting(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
