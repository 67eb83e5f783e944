use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents an object in storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObject {
    /// Key (path) of the object
    pub key: String,
    /// Size of the object in bytes
    pub size: u64,
    /// Last modified time
    pub last_modified: Option<DateTime<Utc>>,
    /// ETag of the object
    pub etag: Option<String>,
}

/// One backup archive as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub filename: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl From<StorageObject> for ArchiveEntry {
    fn from(obj: StorageObject) -> Self {
        Self {
            filename: obj.key,
            size: obj.size,
            modified: obj.last_modified,
        }
    }
}

/// Custom metadata for objects
pub type Metadata = HashMap<String, String>;

/// Connection parameters for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint URL
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// How uploads are retried before a failure is surfaced.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub retries: u32,
    pub cooldown: std::time::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            cooldown: std::time::Duration::from_secs(5),
        }
    }
}
