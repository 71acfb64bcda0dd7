use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    postgres::{PgHasArrayType, PgTypeInfo},
    FromRow,
};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "video_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Statuses that count against an allowance. In-flight jobs are included
    /// so a burst of concurrent requests cannot outrun the counters.
    pub const CONSUMING: [JobStatus; 3] = [JobStatus::Pending, JobStatus::Processing, JobStatus::Completed];

    pub fn is_consuming(&self) -> bool {
        Self::CONSUMING.contains(self)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl PgHasArrayType for JobStatus {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_video_job_status")
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: JobStatus,
    pub prompt: Option<String>,
    pub video_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoJob {
    pub fn pending(user_id: Uuid, prompt: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: JobStatus::Pending,
            prompt,
            video_path: None,
            created_at,
            updated_at: created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateJobRequest {
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub status: JobStatus,
    pub video_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
