use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::errors::{AppError, Result};

pub struct MetricsService {
    registry: Registry,
    quota_decisions: IntCounterVec,
    credits_consumed: IntCounter,
    accounts_deleted: IntCounter,
    video_jobs: IntCounterVec,
}

impl MetricsService {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let quota_decisions = IntCounterVec::new(
            Opts::new("quota_decisions_total", "Video generation permission decisions"),
            &["tier", "outcome"],
        )
        .map_err(metrics_error)?;
        let credits_consumed = IntCounter::new("credits_consumed_total", "Free-tier credits consumed")
            .map_err(metrics_error)?;
        let accounts_deleted = IntCounter::new("accounts_deleted_total", "Accounts permanently deleted")
            .map_err(metrics_error)?;
        let video_jobs = IntCounterVec::new(
            Opts::new("video_jobs_total", "Video job status changes"),
            &["status"],
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(quota_decisions.clone())).map_err(metrics_error)?;
        registry.register(Box::new(credits_consumed.clone())).map_err(metrics_error)?;
        registry.register(Box::new(accounts_deleted.clone())).map_err(metrics_error)?;
        registry.register(Box::new(video_jobs.clone())).map_err(metrics_error)?;

        Ok(Self {
            registry,
            quota_decisions,
            credits_consumed,
            accounts_deleted,
            video_jobs,
        })
    }

    pub fn record_decision(&self, tier: &str, allowed: bool) {
        let outcome = if allowed { "allowed" } else { "denied" };
        self.quota_decisions.with_label_values(&[tier, outcome]).inc();
    }

    pub fn record_credit_consumed(&self) {
        self.credits_consumed.inc();
    }

    pub fn record_account_deleted(&self) {
        self.accounts_deleted.inc();
    }

    pub fn record_job_status(&self, status: &str) {
        self.video_jobs.with_label_values(&[status]).inc();
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;

        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.into()))
    }
}

fn metrics_error(e: prometheus::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("metrics error: {}", e))
}
