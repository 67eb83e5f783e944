use super::{flag_line, parse_flag, ModuleInfo, Platform, SiteType, Tools};
use crate::context::OperationContext;
use crate::error::SiteError;
use crate::runner::Invocation;
use async_trait::async_trait;
use common::DrupalSettings;
use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

const SETTLE_WINDOW: Duration = Duration::from_secs(35);
const MAINTENANCE_KEY: &str = "system.maintenance_mode";
const MAINTENANCE_QUERY: &str = "SELECT convert_from(value, 'UTF8') FROM key_value \
     WHERE collection = 'state' AND name = 'system.maintenance_mode'";

/// Whether `drush status` output has a `Database : Connected` line.
fn reports_connected(status: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?mi)^\s*Database\s*:\s*Connected\s*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(status))
}

pub struct Drupal {
    settings: DrupalSettings,
}

impl Drupal {
    pub fn new(settings: DrupalSettings) -> Self {
        Self { settings }
    }

    /// A drush directory in the home directory marks a Drupal host.
    pub fn detect(settings: &DrupalSettings) -> bool {
        settings.marker_dir.is_dir()
    }

    fn drush<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(self.settings.drush.display().to_string())
            .args(args)
            .current_dir(&self.settings.project_root)
    }

    async fn query_state(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
    ) -> Option<bool> {
        let get = self
            .drush(["state:get", MAINTENANCE_KEY])
            .allow_non_zero();
        match tools.runner.exec(ctx, &get).await {
            Ok(out) if out.success() => {
                // An unset key prints nothing, which reads as disabled.
                Some(flag_line(&out.lines).is_some_and(parse_flag))
            }
            Ok(out) => {
                ctx.warn(format!(
                    "drush state:get exited with {}, falling back to the database",
                    out.exit_code
                ));
                None
            }
            Err(e) => {
                ctx.warn(format!("drush unavailable ({e}), falling back to the database"));
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct DrushModule {
    #[serde(default)]
    package: String,
    #[serde(default)]
    display_name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    version: Option<String>,
}

/// Parses `drush pm:list --format=json`, ignoring any notices around the JSON.
fn parse_pm_list(output: &str) -> Result<Vec<ModuleInfo>, SiteError> {
    let json = match (output.find('{'), output.rfind('}')) {
        (Some(start), Some(end)) if start < end => &output[start..=end],
        _ => return Ok(Vec::new()),
    };
    let modules: BTreeMap<String, DrushModule> = serde_json::from_str(json)
        .map_err(|e| SiteError::InvalidArgument(format!("Unreadable pm:list output: {e}")))?;
    Ok(modules
        .into_iter()
        .map(|(name, m)| ModuleInfo {
            name,
            display_name: m.display_name,
            package: m.package,
            kind: m.kind,
            status: m.status,
            version: m.version,
        })
        .collect())
}

#[async_trait]
impl Platform for Drupal {
    fn site_type(&self) -> SiteType {
        SiteType::Drupal
    }

    fn volumes(&self) -> &[PathBuf] {
        &self.settings.volumes
    }

    fn settle_window(&self) -> Duration {
        SETTLE_WINDOW
    }

    async fn is_installed(&self, ctx: &mut OperationContext, tools: &Tools<'_>) -> bool {
        let status = self.drush(["status"]).allow_non_zero();
        match tools.runner.exec(ctx, &status).await {
            Ok(out) => reports_connected(&out.text()),
            Err(e) => {
                debug!("drush status failed: {e}");
                false
            }
        }
    }

    async fn maintenance_mode(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
    ) -> Result<bool, SiteError> {
        if let Some(enabled) = self.query_state(ctx, tools).await {
            return Ok(enabled);
        }
        let database = tools.database.ok_or_else(|| {
            SiteError::MaintenanceModeFailed("drush failed and no database is configured".into())
        })?;
        let value = database
            .query_text(MAINTENANCE_QUERY)
            .await
            .map_err(|e| SiteError::MaintenanceModeFailed(e.to_string()))?;
        Ok(value.as_deref().map(parse_flag).unwrap_or(false))
    }

    async fn apply_maintenance_mode(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
        enable: bool,
    ) -> Result<(), SiteError> {
        let value = if enable { "1" } else { "0" };
        let set = self.drush(["state:set", MAINTENANCE_KEY, value, "--input-format=integer"]);
        tools.runner.exec(ctx, &set).await?;
        // Rebuild after the flag changes so no stale page is served.
        tools.runner.exec(ctx, &self.drush(["cr"])).await?;
        Ok(())
    }

    async fn delete_files(
        &self,
        ctx: &mut OperationContext,
        _tools: &Tools<'_>,
    ) -> Result<(), SiteError> {
        for volume in &self.settings.volumes {
            ctx.msg(format!("Deleting files in {}", volume.display()));
            match tokio::fs::remove_dir_all(volume).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tokio::fs::create_dir_all(volume).await?;
        }
        Ok(())
    }

    async fn pm_list(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
    ) -> Result<Vec<ModuleInfo>, SiteError> {
        let list = self.drush(["pm:list", "--format=json"]);
        let out = tools.runner.exec(ctx, &list).await?;
        parse_pm_list(&out.text())
    }
}
