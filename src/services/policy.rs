use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    database::Ledger,
    errors::{AppError, Result},
    models::{QuotaPolicy, MONTHLY_LIMIT_SETTING},
};

/// Quota policy loaded once at startup and swapped only on an explicit
/// reload. Evaluations take a copy of the current value.
#[derive(Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<QuotaPolicy>>,
}

impl PolicyHandle {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(policy)),
        }
    }

    pub async fn load(ledger: &dyn Ledger) -> Result<Self> {
        let policy = Self::read_policy(ledger).await?;
        tracing::info!(monthly_limit = policy.monthly_limit, "Loaded quota policy");
        Ok(Self::new(policy))
    }

    pub async fn current(&self) -> QuotaPolicy {
        *self.inner.read().await
    }

    /// A store fault leaves the previous policy in place.
    pub async fn reload(&self, ledger: &dyn Ledger) -> Result<QuotaPolicy> {
        let policy = Self::read_policy(ledger).await?;
        let mut current = self.inner.write().await;
        if *current != policy {
            tracing::info!(
                old_limit = current.monthly_limit,
                new_limit = policy.monthly_limit,
                "Quota policy changed"
            );
        }
        *current = policy;
        Ok(policy)
    }

    pub async fn update(&self, ledger: &dyn Ledger, monthly_limit: i64) -> Result<QuotaPolicy> {
        if monthly_limit <= 0 || monthly_limit > i64::from(u32::MAX) {
            return Err(AppError::Validation(
                "monthly_limit must be a positive integer".to_string(),
            ));
        }

        ledger
            .store_setting(MONTHLY_LIMIT_SETTING, serde_json::json!(monthly_limit))
            .await?;
        self.reload(ledger).await
    }

    async fn read_policy(ledger: &dyn Ledger) -> Result<QuotaPolicy> {
        let raw = ledger.load_setting(MONTHLY_LIMIT_SETTING).await?;
        let policy = QuotaPolicy::from_setting(raw.as_ref());
        tracing::debug!(value = ?raw, monthly_limit = policy.monthly_limit, "Resolved quota policy");
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryLedger;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_without_setting_uses_default() {
        let ledger = MemoryLedger::new();
        let handle = PolicyHandle::load(&ledger).await.unwrap();
        assert_eq!(handle.current().await.monthly_limit, 30);
    }

    #[tokio::test]
    async fn test_setting_change_needs_reload() {
        let ledger = MemoryLedger::new();
        let handle = PolicyHandle::load(&ledger).await.unwrap();

        ledger.store_setting(MONTHLY_LIMIT_SETTING, json!(45)).await.unwrap();
        assert_eq!(handle.current().await.monthly_limit, 30);

        handle.reload(&ledger).await.unwrap();
        assert_eq!(handle.current().await.monthly_limit, 45);
    }

    #[tokio::test]
    async fn test_malformed_setting_falls_back() {
        let ledger = MemoryLedger::new();
        ledger.store_setting(MONTHLY_LIMIT_SETTING, json!("unlimited")).await.unwrap();
        let handle = PolicyHandle::load(&ledger).await.unwrap();
        assert_eq!(handle.current().await.monthly_limit, 30);
    }

    #[tokio::test]
    async fn test_update_rejects_non_positive_limit() {
        let ledger = MemoryLedger::new();
        let handle = PolicyHandle::load(&ledger).await.unwrap();

        assert!(matches!(handle.update(&ledger, 0).await, Err(AppError::Validation(_))));
        assert!(matches!(handle.update(&ledger, -3).await, Err(AppError::Validation(_))));

        let policy = handle.update(&ledger, 12).await.unwrap();
        assert_eq!(policy.monthly_limit, 12);
        assert_eq!(handle.current().await.monthly_limit, 12);
    }
}
