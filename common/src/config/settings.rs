use log::warn;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::file::FileConfig;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Incomplete database configuration, missing: {}", .missing.join(", "))]
    PartialDatabase { missing: Vec<String> },

    #[error("Volume must be an absolute path: {0}")]
    RelativeVolume(String),

    #[error("Failed to expand path: {0}")]
    Expand(String),
}

/// Connection parameters for the site database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

/// Bucket and credentials for the archive store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DrupalSettings {
    /// Directory whose presence identifies a Drupal host.
    pub marker_dir: PathBuf,
    pub drush: PathBuf,
    /// Directory drush commands are run from.
    pub project_root: PathBuf,
    pub volumes: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MoodleSettings {
    /// Language pack file that only a Moodle code tree carries.
    pub lang_marker: PathBuf,
    /// Persistent data directory (moodledata).
    pub data_dir: PathBuf,
    pub code_dir: PathBuf,
    pub php: String,
    /// Static page copied into the data directory to enable maintenance mode.
    pub maintenance_page: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OperationSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub upload_retries: u32,
    pub upload_cooldown: Duration,
    pub cleanup_timeout: Duration,
    pub settle_delay: bool,
}

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: Option<String>,
    app_env: Option<String>,
    pub home: PathBuf,
    pub temp_dir: PathBuf,
    pub database: Option<DatabaseSettings>,
    pub storage: Option<StorageSettings>,
    /// Environment variables that must be set before the archive store can be used.
    pub missing_storage_vars: Vec<String>,
    pub drupal: DrupalSettings,
    pub moodle: MoodleSettings,
    pub operation: OperationSettings,
}

impl Settings {
    pub(crate) fn resolve(raw: FileConfig) -> Result<Self, SettingsError> {
        let home = PathBuf::from(&raw.paths.home);
        let expand = |value: &str| -> PathBuf {
            let home = raw.paths.home.clone();
            PathBuf::from(shellexpand::tilde_with_context(value, || Some(home)).into_owned())
        };

        let database = resolve_database(&raw)?;
        let (storage, missing_storage_vars) = resolve_storage(&raw);
        if !missing_storage_vars.is_empty() {
            warn!(
                "Archive storage unavailable, missing: {}",
                missing_storage_vars.join(", ")
            );
        }

        let drupal = DrupalSettings {
            marker_dir: expand(&raw.drupal.marker_dir),
            drush: expand(&raw.drupal.drush),
            project_root: expand(&raw.drupal.project_root),
            volumes: absolute_volumes(raw.drupal.volumes.iter().map(|v| expand(v)))?,
        };

        let moodle = MoodleSettings {
            lang_marker: expand(&raw.moodle.lang_marker),
            data_dir: expand(&raw.moodle.data_dir),
            code_dir: expand(&raw.moodle.code_dir),
            php: raw.moodle.php.clone(),
            maintenance_page: raw.moodle.maintenance_page.as_deref().map(|p| expand(p)),
        };
        absolute_volumes([moodle.data_dir.clone(), moodle.code_dir.clone()])?;

        let temp_dir = raw
            .paths
            .temp_dir
            .as_deref()
            .map(|p| expand(p))
            .unwrap_or_else(std::env::temp_dir);

        let operation = OperationSettings {
            timeout: Duration::from_secs(raw.operation.timeout_secs),
            poll_interval: Duration::from_secs(raw.operation.poll_interval_secs.max(1)),
            upload_retries: raw.operation.upload_retries,
            upload_cooldown: Duration::from_secs(raw.operation.upload_cooldown_secs),
            cleanup_timeout: Duration::from_secs(raw.operation.cleanup_timeout_secs),
            settle_delay: raw.operation.settle_delay,
        };

        Ok(Self {
            app_name: raw.app.name.clone(),
            app_env: raw.app.env.clone(),
            home,
            temp_dir,
            database,
            storage,
            missing_storage_vars,
            drupal,
            moodle,
            operation,
        })
    }

    /// Environment tag used to name backup archives. Falls back to the application name.
    pub fn app_env(&self) -> Option<&str> {
        self.app_env.as_deref().or(self.app_name.as_deref())
    }
}

fn resolve_database(raw: &FileConfig) -> Result<Option<DatabaseSettings>, SettingsError> {
    let db = &raw.database;
    let fields = [
        ("DB_HOST", &db.host),
        ("DB_USER", &db.user),
        ("DB_PASSWORD", &db.password),
        ("DB_NAME", &db.name),
    ];
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(var, _)| var.to_string())
        .collect();

    match missing.len() {
        0 => Ok(Some(DatabaseSettings {
            host: db.host.clone().unwrap_or_default(),
            port: db.port,
            user: db.user.clone().unwrap_or_default(),
            password: db.password.clone().unwrap_or_default(),
            name: db.name.clone().unwrap_or_default(),
        })),
        n if n == fields.len() => Ok(None),
        _ => Err(SettingsError::PartialDatabase { missing }),
    }
}

fn resolve_storage(raw: &FileConfig) -> (Option<StorageSettings>, Vec<String>) {
    let s = &raw.storage;
    let fields = [
        ("AWS_ACCESS_KEY_ID", &s.access_key_id),
        ("AWS_SECRET_ACCESS_KEY", &s.secret_access_key),
        ("AWS_S3_BUCKET", &s.bucket),
        ("AWS_S3_REGION", &s.region),
    ];
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(var, _)| var.to_string())
        .collect();
    if !missing.is_empty() {
        return (None, missing);
    }

    let storage = StorageSettings {
        bucket: s.bucket.clone().unwrap_or_default(),
        region: s.region.clone().unwrap_or_default(),
        access_key_id: s.access_key_id.clone().unwrap_or_default(),
        secret_access_key: s.secret_access_key.clone().unwrap_or_default(),
        endpoint: s.endpoint.clone(),
    };
    (Some(storage), missing)
}

fn absolute_volumes<I>(volumes: I) -> Result<Vec<PathBuf>, SettingsError>
where
    I: IntoIterator<Item = PathBuf>,
{
    volumes
        .into_iter()
        .map(|v| {
            if Path::new(&v).is_absolute() {
                Ok(v)
            } else {
                Err(SettingsError::RelativeVolume(v.display().to_string()))
            }
        })
        .collect()
}
