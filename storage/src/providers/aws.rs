use crate::{Metadata, StorageError, StorageObject, StorageProvider};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use chrono::{TimeZone, Utc};
use log::{debug, error, info};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

/// 5MB, the S3 minimum for every part but the last.
const PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum ProviderKind {
    Aws,
    Minio,
    Other(String),
}

pub struct S3Provider {
    /// S3 client
    client: Client,
    /// Provider kind (for provider-specific config/quirks)
    provider_kind: ProviderKind,
}

impl S3Provider {
    /// Creates a new S3 provider. A custom endpoint switches the client to
    /// path-style addressing, which S3-compatible services expect.
    pub async fn new(
        region: Option<String>,
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
    ) -> Result<Self, StorageError> {
        let region_str = region.unwrap_or_else(|| "us-east-1".to_string());
        let provider_kind = match &endpoint {
            None => ProviderKind::Aws,
            Some(ep) if ep.contains(":9000") => ProviderKind::Minio,
            Some(ep) => ProviderKind::Other(ep.clone()),
        };
        info!("Initializing S3Provider for {provider_kind:?} in {region_str}");

        let mut config_builder = aws_config::defaults(BehaviorVersion::v2025_01_17())
            .region(Region::new(region_str))
            .retry_config(aws_config::retry::RetryConfig::standard().with_max_attempts(3));

        // Add credentials if provided
        if let (Some(access_key), Some(secret_key)) = (access_key, secret_key) {
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "static-credentials-provider",
            );
            config_builder =
                config_builder.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        if let Some(ref endpoint) = endpoint {
            info!("Using custom endpoint: {endpoint}");
            config_builder = config_builder.endpoint_url(endpoint);
        }

        let sdk_config = config_builder.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if endpoint.is_some() {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }
        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client,
            provider_kind,
        })
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.provider_kind
    }

    /// Converts an S3 object to a StorageObject
    fn convert_s3_object(obj: &aws_sdk_s3::types::Object) -> StorageObject {
        StorageObject {
            key: obj.key().unwrap_or_default().to_string(),
            size: obj.size().and_then(|size| u64::try_from(size).ok()).unwrap_or(0),
            last_modified: obj
                .last_modified()
                .and_then(|t| Utc.timestamp_opt(t.secs(), 0).single()),
            etag: obj.e_tag().map(|s| s.to_string()),
        }
    }

    /// Helper: initiate a multipart upload and return the upload_id
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<String, StorageError> {
        let mut req = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key);
        if let Some(content_type) = content_type {
            req = req.content_type(content_type);
        }
        if let Some(metadata) = metadata {
            for (k, v) in metadata {
                req = req.metadata(k, v);
            }
        }
        let resp = req.send().await.map_err(|e| {
            error!("Failed to initiate multipart upload for {bucket}/{key}: {e}");
            StorageError::Aws(e.to_string())
        })?;
        resp.upload_id()
            .map(|s| s.to_string())
            .ok_or_else(|| StorageError::Unexpected("No upload_id returned from S3".to_string()))
    }

    /// Uploads the remainder of `reader` as the parts of an open multipart upload.
    async fn upload_parts<R>(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        reader: &mut R,
    ) -> Result<Vec<CompletedPart>, StorageError>
    where
        R: tokio::io::AsyncRead + Unpin + Send,
    {
        let mut parts = Vec::new();
        let mut part_number = 1;
        loop {
            let mut buf = vec![0u8; PART_SIZE];
            let mut filled = 0;
            while filled < PART_SIZE {
                let n = reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            let is_last_part = filled < PART_SIZE;
            debug!("Uploading part {part_number} ({filled} bytes)");
            buf.truncate(filled);
            let resp = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buf))
                .send()
                .await
                .map_err(|e| {
                    error!("Failed to upload part {part_number} for {bucket}/{key}: {e:?}");
                    report_s3_error_to_sentry("upload_file:upload_part", &e, bucket, key);
                    StorageError::Aws(e.to_string())
                })?;
            parts.push(
                CompletedPart::builder()
                    .set_part_number(Some(part_number))
                    .set_e_tag(resp.e_tag().map(|s| s.to_string()))
                    .build(),
            );
            part_number += 1;
            if is_last_part {
                break;
            }
        }
        Ok(parts)
    }
}

#[async_trait]
impl StorageProvider for S3Provider {
    fn name(&self) -> &str {
        "AWS S3"
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<StorageObject>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(str::to_string))
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| {
                    error!("Failed to list objects in bucket {bucket}: {e}");
                    StorageError::Aws(e.to_string())
                })?;

            objects.extend(resp.contents().iter().map(Self::convert_s3_object));

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} objects in {bucket}", objects.len());
        Ok(objects)
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        content_type: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<(), StorageError> {
        let file = tokio::fs::File::open(file_path).await.map_err(|e| {
            error!("Failed to open file {}: {}", file_path.display(), e);
            StorageError::Io(e)
        })?;
        let file_size = file.metadata().await?.len();
        let mut reader = BufReader::new(file);

        // Use single put_object for small files
        if file_size <= PART_SIZE as u64 {
            let mut buffer = Vec::with_capacity(file_size as usize);
            reader.read_to_end(&mut buffer).await?;
            let mut req = self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(buffer));
            if let Some(content_type) = content_type {
                req = req.content_type(content_type);
            }
            if let Some(metadata) = metadata {
                for (k, v) in metadata {
                    req = req.metadata(k, v);
                }
            }
            req.send().await.map_err(|e| {
                error!("Failed to upload file to {bucket}/{key}: {e}");
                StorageError::Aws(e.to_string())
            })?;
            info!(
                "Uploaded file {} to {}/{} ({} bytes) in single part",
                file_path.display(),
                bucket,
                key,
                file_size
            );
            return Ok(());
        }

        debug!("Initiating multipart upload: bucket={bucket}, key={key}, file_size={file_size}");
        let upload_id = self
            .initiate_multipart_upload(bucket, key, content_type, metadata)
            .await?;

        let parts = match self.upload_parts(bucket, key, &upload_id, &mut reader).await {
            Ok(parts) => parts,
            Err(e) => {
                // Leave no orphaned parts behind; the retry starts a fresh upload.
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    error!("Failed to abort multipart upload for {bucket}/{key}: {abort}");
                }
                return Err(e);
            }
        };

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to complete multipart upload for {bucket}/{key}: {e:?}");
                report_s3_error_to_sentry("upload_file:complete_multipart_upload", &e, bucket, key);
                StorageError::Aws(e.to_string())
            })?;
        info!("Multipart upload completed: {}/{}", bucket, key);
        Ok(())
    }

    async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<(), StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("NoSuchKey") || msg.contains("404") {
                    StorageError::NotFound(format!("Object {bucket}/{key} not found"))
                } else {
                    StorageError::Aws(msg)
                }
            })?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = resp.body.into_async_read();
        let bytes = tokio::io::copy(&mut stream, &mut file).await?;
        file.flush().await?;
        info!("Downloaded {bucket}/{key} to {} ({bytes} bytes)", destination.display());
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false) =>
            {
                Ok(false)
            }
            Err(e) => {
                error!("Error checking object existence for {bucket}/{key}: {e}");
                Err(StorageError::Aws(e.to_string()))
            }
        }
    }
}

fn report_s3_error_to_sentry(
    operation: &str,
    error: &dyn std::error::Error,
    bucket: &str,
    key: &str,
) {
    let mut extra = HashMap::new();
    extra.insert("bucket", bucket);
    extra.insert("key", key);

    let extra_json = serde_json::to_string(&extra).unwrap_or_default();
    let sentry_message = format!("{operation}: {error} | context: {extra_json}");
    sentry::capture_message(&sentry_message, sentry::Level::Error);
}
