use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::Result;

pub mod local;

/// Per-user media (dream audio, generated videos), stored under a
/// `<user_id>/` prefix by the generation pipeline.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Removes every object owned by the user and returns how many were
    /// removed. Succeeds when nothing is stored, so a retried deletion is safe.
    async fn delete_user_media(&self, user_id: Uuid) -> Result<u64>;
}

pub fn create_storage(config: &Config) -> Result<Arc<dyn MediaStorage>> {
    let storage = local::LocalStorage::new(&config.media_dir)?;
    Ok(Arc::new(storage))
}
