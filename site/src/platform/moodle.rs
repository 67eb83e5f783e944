use super::{empty_dir, Platform, SiteType, Tools};
use crate::context::OperationContext;
use crate::error::SiteError;
use crate::runner::Invocation;
use async_trait::async_trait;
use common::MoodleSettings;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

const SETTLE_WINDOW: Duration = Duration::from_secs(300);
/// While this file exists in the data directory, Moodle serves it instead of the site.
const MAINTENANCE_MARKER: &str = "climaintenance.html";
const INSTALLED_MARKER: &str = ".htaccess";
const DEFAULT_MAINTENANCE_PAGE: &str = include_str!("../../assets/climaintenance.html");

fn reports_enabled(output: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?mi)^\s*status:.*\benabled\b").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(output))
}

pub struct Moodle {
    settings: MoodleSettings,
    volumes: Vec<PathBuf>,
}

impl Moodle {
    pub fn new(settings: MoodleSettings) -> Self {
        let volumes = vec![settings.data_dir.clone(), settings.code_dir.clone()];
        Self { settings, volumes }
    }

    /// Only a Moodle code tree ships this language file.
    pub fn detect(settings: &MoodleSettings) -> bool {
        settings.lang_marker.is_file()
    }

    fn installed(&self) -> bool {
        self.settings.data_dir.join(INSTALLED_MARKER).is_file()
    }

    fn marker(&self) -> PathBuf {
        self.settings.data_dir.join(MAINTENANCE_MARKER)
    }

    fn php_cli(&self, script: &str) -> Invocation {
        Invocation::new(&self.settings.php)
            .arg(format!("admin/cli/{script}"))
            .current_dir(&self.settings.code_dir)
    }

    async fn maintenance_page(&self) -> Result<String, SiteError> {
        match &self.settings.maintenance_page {
            Some(page) => Ok(tokio::fs::read_to_string(page).await?),
            None => Ok(DEFAULT_MAINTENANCE_PAGE.to_string()),
        }
    }

    async fn purge_caches(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
    ) -> Result<(), SiteError> {
        if self.installed() {
            tools
                .runner
                .exec(ctx, &self.php_cli("purge_caches.php"))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for Moodle {
    fn site_type(&self) -> SiteType {
        SiteType::Moodle
    }

    fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    fn settle_window(&self) -> Duration {
        SETTLE_WINDOW
    }

    /// The maintenance marker must outlive the data directory sync, or the
    /// site would go live before the database is reloaded.
    fn sync_excludes(&self, volume: &Path) -> Vec<String> {
        if volume == self.settings.data_dir {
            vec![format!("/{MAINTENANCE_MARKER}")]
        } else {
            Vec::new()
        }
    }

    async fn is_installed(&self, _ctx: &mut OperationContext, _tools: &Tools<'_>) -> bool {
        self.installed()
    }

    async fn maintenance_mode(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
    ) -> Result<bool, SiteError> {
        if self.installed() {
            let status = self.php_cli("maintenance.php").allow_non_zero();
            match tools.runner.exec(ctx, &status).await {
                Ok(out) if out.success() => return Ok(reports_enabled(&out.text())),
                Ok(out) => ctx.warn(format!(
                    "maintenance.php exited with {}, checking {MAINTENANCE_MARKER}",
                    out.exit_code
                )),
                Err(e) => ctx.warn(format!("{e}, checking {MAINTENANCE_MARKER}")),
            }
        }
        Ok(tokio::fs::try_exists(self.marker()).await?)
    }

    async fn apply_maintenance_mode(
        &self,
        ctx: &mut OperationContext,
        tools: &Tools<'_>,
        enable: bool,
    ) -> Result<(), SiteError> {
        if enable {
            let page = self.maintenance_page().await?;
            tokio::fs::write(self.marker(), page).await?;
            self.purge_caches(ctx, tools).await?;
            return Ok(());
        }

        self.purge_caches(ctx, tools).await?;
        if self.installed() {
            let disable = self.php_cli("maintenance.php").arg("--disable");
            tools.runner.exec(ctx, &disable).await?;
        } else {
            match tokio::fs::remove_file(self.marker()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn delete_files(
        &self,
        ctx: &mut OperationContext,
        _tools: &Tools<'_>,
    ) -> Result<(), SiteError> {
        let data_dir = &self.settings.data_dir;
        let removed = empty_dir(data_dir).await?;
        ctx.msg(format!("Removed {removed} entries from {}", data_dir.display()));
        Ok(())
    }
}
