//! Platform adapters: the per-application primitives the backup and restore
//! sequences are built from.

mod drupal;
mod moodle;

pub use drupal::Drupal;
pub use moodle::Moodle;

use crate::context::OperationContext;
use crate::error::SiteError;
use crate::runner::CommandRunner;
use async_trait::async_trait;
use common::Settings;
use postgres::DatabaseBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteType {
    Drupal,
    Moodle,
}

impl SiteType {
    /// Detects the application on this host from the filesystem alone.
    pub fn detect(settings: &Settings) -> Option<SiteType> {
        if Drupal::detect(&settings.drupal) {
            Some(SiteType::Drupal)
        } else if Moodle::detect(&settings.moodle) {
            Some(SiteType::Moodle)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteType::Drupal => "drupal",
            SiteType::Moodle => "moodle",
        }
    }

    pub fn platform(&self, settings: &Settings) -> Box<dyn Platform> {
        match self {
            SiteType::Drupal => Box::new(Drupal::new(settings.drupal.clone())),
            SiteType::Moodle => Box::new(Moodle::new(settings.moodle.clone())),
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An installed module or plugin as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub display_name: String,
    pub package: String,
    pub kind: String,
    pub status: String,
    pub version: Option<String>,
}

/// Collaborators a platform primitive may use.
pub struct Tools<'a> {
    pub runner: &'a CommandRunner,
    pub database: Option<&'a dyn DatabaseBackend>,
}

#[async_trait]
pub trait Platform: Send + Sync {
    fn site_type(&self) -> SiteType;

    /// Absolute directories archived by a backup.
    fn volumes(&self) -> &[PathBuf];

    /// How long background jobs are given to drain after maintenance mode is entered.
    fn settle_window(&self) -> Duration;

    /// Paths under `volume` a restore must leave in place, as rsync
    /// `--exclude` patterns relative to the volume.
    fn sync_excludes(&self, _volume: &Path) -> Vec<String> {
        Vec::new()
    }

    /// Whether the application is actually deployed, as opposed to merely detected.
    async fn is_installed(&self, ctx: &mut OperationContext, tools: &Tools<'_>) -> bool;

    /// Queries the live maintenance flag.
    async fn maintenance_mode(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
    ) -> Result<bool, SiteError>;

    /// Switches maintenance mode unconditionally; callers query first.
    async fn apply_maintenance_mode(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
        enable: bool,
    ) -> Result<(), SiteError>;

    /// Leaves every volume present and empty.
    async fn delete_files(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
    ) -> Result<(), SiteError>;

    async fn pm_list(
        &self,
        _ctx: &mut OperationContext,
        _tools: &Tools<'_>,
    ) -> Result<Vec<ModuleInfo>, SiteError> {
        Err(SiteError::Unsupported(format!(
            "Module listing for {}",
            self.site_type()
        )))
    }
}

/// Removes everything inside `dir`, hidden entries included, keeping `dir`.
pub(crate) async fn empty_dir(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        removed += 1;
    }
    Ok(removed)
}

const ENABLED_FLAGS: [&str; 6] = ["1", "true", "on", "b:1;", "i:1;", "s:1:\"1\";"];
const DISABLED_FLAGS: [&str; 8] = ["0", "false", "off", "b:0;", "i:0;", "s:1:\"0\";", "null", "n;"];

fn normalize_flag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_ascii_lowercase()
}

/// Reads a stored boolean that may be a plain value or a PHP-serialized one.
pub(crate) fn parse_flag(raw: &str) -> bool {
    ENABLED_FLAGS.contains(&normalize_flag(raw).as_str())
}

/// The last line of command output that holds a boolean value. Notices and
/// warnings printed around the value are skipped.
pub(crate) fn flag_line(lines: &[String]) -> Option<&str> {
    lines.iter().rev().map(String::as_str).find(|line| {
        let flag = normalize_flag(line);
        ENABLED_FLAGS.contains(&flag.as_str()) || DISABLED_FLAGS.contains(&flag.as_str())
    })
}
