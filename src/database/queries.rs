use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::*;
use crate::services::quota_evaluator::MonthWindow;

const PROFILE_COLUMNS: &str = "id, subscription_tier, credits_remaining, created_at, updated_at";
const JOB_COLUMNS: &str = "id, user_id, status, prompt, video_path, created_at, updated_at";

pub struct ProfileQueries;

impl ProfileQueries {
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(account)
    }

    /// Row-locks the profile until the surrounding transaction ends.
    pub async fn lock_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {} FROM profiles WHERE id = $1 FOR UPDATE",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(account)
    }

    pub async fn insert_free<'e, E: PgExecutor<'e>>(executor: E, id: Uuid, credits: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, subscription_tier, credits_remaining)
            VALUES ($1, 'free', $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(credits.max(0))
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn set_tier<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        tier: SubscriptionTier,
    ) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            "UPDATE profiles SET subscription_tier = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .bind(tier)
        .fetch_optional(executor)
        .await?;

        Ok(account)
    }

    /// The guard lives in the WHERE clause, so the check and the write are a
    /// single statement.
    pub async fn decrement_credits<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET credits_remaining = credits_remaining - 1, updated_at = NOW()
            WHERE id = $1 AND subscription_tier = 'free' AND credits_remaining > 0
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct JobQueries;

impl JobQueries {
    pub async fn insert<'e, E: PgExecutor<'e>>(executor: E, job: &VideoJob) -> Result<VideoJob> {
        let job = sqlx::query_as::<_, VideoJob>(&format!(
            r#"
            INSERT INTO video_jobs (id, user_id, status, prompt, video_path, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job.id)
        .bind(job.user_id)
        .bind(job.status)
        .bind(&job.prompt)
        .bind(&job.video_path)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(executor)
        .await?;

        Ok(job)
    }

    pub async fn count_consuming<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        window: MonthWindow,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM video_jobs
            WHERE user_id = $1
              AND created_at >= $2
              AND created_at < $3
              AND status = ANY($4)
            "#,
        )
        .bind(user_id)
        .bind(window.start)
        .bind(window.end)
        .bind(&JobStatus::CONSUMING[..])
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<VideoJob>> {
        let job = sqlx::query_as::<_, VideoJob>(&format!(
            "SELECT {} FROM video_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(job)
    }

    pub async fn lock_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<VideoJob>> {
        let job = sqlx::query_as::<_, VideoJob>(&format!(
            "SELECT {} FROM video_jobs WHERE id = $1 FOR UPDATE",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(job)
    }

    pub async fn list_by_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<VideoJob>> {
        let jobs = sqlx::query_as::<_, VideoJob>(&format!(
            r#"
            SELECT {}
            FROM video_jobs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            JOB_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await?;

        Ok(jobs)
    }

    pub async fn update_status<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        status: JobStatus,
        video_path: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<VideoJob> {
        let job = sqlx::query_as::<_, VideoJob>(&format!(
            r#"
            UPDATE video_jobs
            SET status = $2, video_path = COALESCE($3, video_path), updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(video_path)
        .bind(now)
        .fetch_one(executor)
        .await?;

        Ok(job)
    }

    pub async fn delete_by_user<'e, E: PgExecutor<'e>>(executor: E, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM video_jobs WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}

pub struct SettingsQueries;

impl SettingsQueries {
    pub async fn get<'e, E: PgExecutor<'e>>(executor: E, key: &str) -> Result<Option<serde_json::Value>> {
        let value: Option<Option<serde_json::Value>> =
            sqlx::query_scalar("SELECT value FROM app_settings WHERE key = $1")
                .bind(key)
                .fetch_optional(executor)
                .await?;

        Ok(value.flatten())
    }

    pub async fn put<'e, E: PgExecutor<'e>>(executor: E, key: &str, value: &serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(executor)
        .await?;

        Ok(())
    }
}
