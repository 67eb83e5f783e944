use crate::{ArchiveEntry, RetryPolicy, StorageConfig, StorageError, StorageProvider, StorageProviderFactory};
use log::{info, warn};
use std::path::Path;

/// A single bucket holding backup archives.
pub struct ArchiveStore {
    provider: Box<dyn StorageProvider>,
    bucket: String,
    retry: RetryPolicy,
}

impl ArchiveStore {
    /// Connects to the bucket described by `config` through the S3 provider.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::Configuration("bucket name is empty".to_string()));
        }
        let provider = StorageProviderFactory::create_s3_provider(config).await?;
        Ok(Self::with_provider(provider, config.bucket.clone()))
    }

    pub fn with_provider(provider: Box<dyn StorageProvider>, bucket: impl Into<String>) -> Self {
        Self {
            provider,
            bucket: bucket.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Uploads `path` under `key`. Transient failures are retried after the
    /// configured cooldown; the last error is returned once retries run out.
    pub async fn upload(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let mut attempt = 0;
        loop {
            match self
                .provider
                .upload_file(&self.bucket, key, path, Some("application/gzip"), None)
                .await
            {
                Ok(()) => {
                    info!("Uploaded {} to {}/{}", path.display(), self.bucket, key);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.retry.retries => {
                    attempt += 1;
                    warn!(
                        "Upload of {key} failed ({e}), retrying in {:?} ({attempt}/{})",
                        self.retry.cooldown, self.retry.retries
                    );
                    tokio::time::sleep(self.retry.cooldown).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Downloads `key` into `path`, failing with [`StorageError::NotFound`]
    /// when the bucket has no such object.
    pub async fn download(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        if !self.provider.object_exists(&self.bucket, key).await? {
            return Err(StorageError::NotFound(format!(
                "{key} does not exist in bucket {}",
                self.bucket
            )));
        }
        self.provider.download_file(&self.bucket, key, path).await
    }

    /// Lists every archive in the bucket whose key contains `filter`,
    /// compared case-insensitively.
    pub async fn list(&self, filter: Option<&str>) -> Result<Vec<ArchiveEntry>, StorageError> {
        let needle = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);
        let objects = self.provider.list_objects(&self.bucket, None).await?;
        Ok(objects
            .into_iter()
            .filter(|obj| match &needle {
                Some(needle) => obj.key.to_lowercase().contains(needle),
                None => true,
            })
            .map(ArchiveEntry::from)
            .collect())
    }
}
