use config::{Config, File};
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;

use super::settings::{Settings, SettingsError};

/// Configuration files, lowest precedence first.
pub const CONFIG_PATHS: [&str; 3] = [
    "/etc/remote-manage/manage.toml",
    "~/.config/remote-manage/manage.toml",
    "manage.toml",
];

/// Environment variables and the configuration key each one overrides.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("APP_NAME", "app.name"),
    ("APP_ENV", "app.env"),
    ("HOME", "paths.home"),
    ("DB_HOST", "database.host"),
    ("DB_PORT", "database.port"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_NAME", "database.name"),
    ("AWS_ACCESS_KEY_ID", "storage.access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "storage.secret_access_key"),
    ("AWS_S3_BUCKET", "storage.bucket"),
    ("AWS_S3_REGION", "storage.region"),
    ("AWS_ENDPOINT", "storage.endpoint"),
];

#[derive(Debug, Deserialize)]
pub(crate) struct FileConfig {
    #[serde(default)]
    pub app: AppSection,
    pub paths: PathsSection,
    pub database: DatabaseSection,
    #[serde(default)]
    pub storage: StorageSection,
    pub drupal: DrupalSection,
    pub moodle: MoodleSection,
    pub operation: OperationSection,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AppSection {
    pub name: Option<String>,
    pub env: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathsSection {
    pub home: String,
    pub temp_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DatabaseSection {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StorageSection {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DrupalSection {
    pub marker_dir: String,
    pub drush: String,
    pub project_root: String,
    pub volumes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoodleSection {
    pub lang_marker: String,
    pub data_dir: String,
    pub code_dir: String,
    pub php: String,
    pub maintenance_page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OperationSection {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub upload_retries: u32,
    pub upload_cooldown_secs: u64,
    pub cleanup_timeout_secs: u64,
    pub settle_delay: bool,
}

/// Loads the settings from the standard configuration files and the process environment.
pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from(&CONFIG_PATHS, |var| std::env::var(var).ok())
}

/// Loads the settings from the given configuration files, then applies the
/// variables returned by `lookup` on top. Files that don't exist are skipped.
pub fn load_settings_from<F>(paths: &[&str], lookup: F) -> Result<Settings, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = Config::builder()
        .set_default("paths.home", "/opt/app-root/src")?
        .set_default("database.port", 5432)?
        .set_default("drupal.marker_dir", "~/drush")?
        .set_default("drupal.drush", "~/vendor/bin/drush")?
        .set_default("drupal.project_root", "~")?
        .set_default("drupal.volumes", vec!["~/html/sites"])?
        .set_default("moodle.lang_marker", "~/lang/en/moodle.php")?
        .set_default("moodle.data_dir", "/opt/app-root/moodledata")?
        .set_default("moodle.code_dir", "~")?
        .set_default("moodle.php", "php")?
        .set_default("operation.timeout_secs", 10800)?
        .set_default("operation.poll_interval_secs", 2)?
        .set_default("operation.upload_retries", 2)?
        .set_default("operation.upload_cooldown_secs", 5)?
        .set_default("operation.cleanup_timeout_secs", 60)?
        .set_default("operation.settle_delay", true)?;

    for path in paths {
        let path = shellexpand::full(path)
            .map_err(|e| SettingsError::Expand(e.to_string()))?
            .into_owned();
        if Path::new(&path).exists() {
            info!("Reading configuration from {path}");
            builder = builder.add_source(File::with_name(&path));
        }
    }

    for &(var, key) in ENV_OVERRIDES {
        let value = lookup(var).filter(|v| !v.trim().is_empty());
        if value.is_some() {
            debug!("{var} overrides {key}");
        }
        builder = builder.set_override_option(key, value)?;
    }

    let raw: FileConfig = builder.build()?.try_deserialize()?;
    Settings::resolve(raw)
}
