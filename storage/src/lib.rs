//! Archive transfer for S3-compatible object storage.
//!
//! The [`StorageProvider`] trait is the raw object-store surface; [`ArchiveStore`]
//! layers the backup semantics on top of it: one bucket, retried uploads,
//! existence-checked downloads and filtered listings.

mod archive;
mod error;
pub mod providers;
mod types;

pub use archive::ArchiveStore;
pub use error::StorageError;
pub use providers::*;
pub use types::*;

use async_trait::async_trait;
use std::path::Path;

/// Core storage provider interface for S3-compatible storage services.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    /// Returns the name of the storage provider.
    fn name(&self) -> &str;

    /// Lists every object in a bucket with an optional prefix, following
    /// continuation tokens until the listing is exhausted.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<StorageObject>, StorageError>;

    /// Uploads a file to the storage provider.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        content_type: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<(), StorageError>;

    /// Downloads an object to a file.
    async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<(), StorageError>;

    /// Checks if an object exists.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;
}

/// Factory for creating storage providers.
pub struct StorageProviderFactory;

impl StorageProviderFactory {
    pub async fn create_s3_provider(
        config: &StorageConfig,
    ) -> Result<Box<dyn StorageProvider>, StorageError> {
        let provider = providers::aws::S3Provider::new(
            config.region.clone(),
            config.endpoint.clone(),
            config.access_key.clone(),
            config.secret_key.clone(),
        )
        .await?;
        Ok(Box::new(provider))
    }
}
