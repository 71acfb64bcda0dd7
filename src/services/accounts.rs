use std::sync::Arc;
use uuid::Uuid;

use crate::{
    database::Ledger,
    errors::{AppError, Result},
    models::{DeletedAccount, SubscriptionTier, UserAccount},
    services::metrics::MetricsService,
    storage::MediaStorage,
};

#[derive(Clone)]
pub struct AccountService {
    ledger: Arc<dyn Ledger>,
    storage: Arc<dyn MediaStorage>,
    metrics: Arc<MetricsService>,
    initial_free_credits: i32,
}

impl AccountService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        storage: Arc<dyn MediaStorage>,
        metrics: Arc<MetricsService>,
        initial_free_credits: i32,
    ) -> Self {
        Self {
            ledger,
            storage,
            metrics,
            initial_free_credits,
        }
    }

    pub async fn provision(&self, user_id: Uuid) -> Result<UserAccount> {
        let account = self
            .ledger
            .provision_account(user_id, self.initial_free_credits)
            .await?;
        tracing::info!(%user_id, tier = %account.subscription_tier, "Provisioned account");
        Ok(account)
    }

    pub async fn find(&self, user_id: Uuid) -> Result<UserAccount> {
        self.ledger.find_account(user_id).await?.ok_or(AppError::NotFound)
    }

    pub async fn set_tier(&self, user_id: Uuid, tier: SubscriptionTier) -> Result<UserAccount> {
        let account = self
            .ledger
            .set_subscription_tier(user_id, tier)
            .await?
            .ok_or(AppError::NotFound)?;
        tracing::info!(%user_id, %tier, "Changed subscription tier");
        Ok(account)
    }

    /// Removes media first (idempotent), then jobs and the profile in one
    /// ledger transaction.
    pub async fn delete(&self, user_id: Uuid) -> Result<DeletedAccount> {
        let media_removed = self.storage.delete_user_media(user_id).await?;
        let deleted = match self.ledger.delete_account(user_id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(
                    %user_id,
                    media_removed,
                    error = %e,
                    "Media removed but ledger deletion failed; account needs a retry"
                );
                return Err(e);
            }
        };

        if deleted.is_empty() && media_removed == 0 {
            return Err(AppError::NotFound);
        }

        self.metrics.record_account_deleted();
        tracing::info!(
            %user_id,
            jobs_removed = deleted.jobs_removed,
            media_removed,
            "Deleted account"
        );
        Ok(deleted)
    }
}
