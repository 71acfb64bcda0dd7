use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    storage::MediaStorage,
};

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&base_path)
            .map_err(|e| AppError::Storage(format!("Failed to create media directory: {}", e)))?;

        Ok(Self { base_path })
    }

    fn user_dir(&self, user_id: Uuid) -> PathBuf {
        self.base_path.join(user_id.to_string())
    }
}

/// Counts files at any depth below `root`.
async fn count_files(root: &Path) -> Result<u64> {
    let mut pending = vec![root.to_path_buf()];
    let mut count = 0u64;

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await
            .map_err(|e| AppError::Storage(format!("Failed to list media: {}", e)))?;

        while let Some(entry) = entries.next_entry().await
            .map_err(|e| AppError::Storage(format!("Failed to list media: {}", e)))?
        {
            let file_type = entry.file_type().await
                .map_err(|e| AppError::Storage(format!("Failed to stat media: {}", e)))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else {
                count += 1;
            }
        }
    }

    Ok(count)
}

#[async_trait]
impl MediaStorage for LocalStorage {
    async fn delete_user_media(&self, user_id: Uuid) -> Result<u64> {
        let user_dir = self.user_dir(user_id);

        let present = fs::try_exists(&user_dir).await
            .map_err(|e| AppError::Storage(format!("Failed to stat media: {}", e)))?;
        if !present {
            return Ok(0);
        }

        let removed = count_files(&user_dir).await?;
        fs::remove_dir_all(&user_dir).await
            .map_err(|e| AppError::Storage(format!("Failed to delete media: {}", e)))?;

        tracing::debug!(%user_id, removed, "Deleted user media");
        Ok(removed)
    }
}
