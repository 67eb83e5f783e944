use crate::archive::{volume_member, BackupArchive, DATABASE_DUMP};
use crate::context::OperationContext;
use crate::error::SiteError;
use crate::platform::{ModuleInfo, Platform, SiteType, Tools};
use crate::runner::{CommandRunner, Invocation};
use crate::settle::current_settle_delay;
use chrono::Local;
use common::{OperationSettings, Settings};
use log::{debug, info, warn};
use postgres::{DatabaseBackend, Postgres, PostgresConfig};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use storage::{ArchiveStore, RetryPolicy, StorageConfig};

const CLEANUP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Collaborators and configuration a [`Site`] is assembled from.
pub struct SiteParts {
    pub app_name: String,
    pub app_env: String,
    pub store: Option<ArchiveStore>,
    /// Variables whose absence left `store` empty.
    pub missing_storage: Vec<String>,
    pub database: Option<Box<dyn DatabaseBackend>>,
    pub temp_dir: PathBuf,
    pub operation: OperationSettings,
}

/// One detected application instance and everything needed to operate on it.
pub struct Site {
    platform: Box<dyn Platform>,
    runner: CommandRunner,
    store: Option<ArchiveStore>,
    missing_storage: Vec<String>,
    database: Option<Box<dyn DatabaseBackend>>,
    app_name: String,
    app_env: String,
    work_dir: PathBuf,
    operation: OperationSettings,
    site_exists: bool,
    in_maintenance: bool,
    /// Maintenance flag seen before this operation changed it.
    original_maintenance: Option<bool>,
}

/// Connects to the configured bucket, or reports which variables are missing.
pub async fn open_archive_store(settings: &Settings) -> Result<ArchiveStore, SiteError> {
    let Some(storage) = &settings.storage else {
        return Err(SiteError::CredentialsMissing(
            settings.missing_storage_vars.clone(),
        ));
    };
    let config = StorageConfig {
        bucket: storage.bucket.clone(),
        region: Some(storage.region.clone()),
        endpoint: storage.endpoint.clone(),
        access_key: Some(storage.access_key_id.clone()),
        secret_key: Some(storage.secret_access_key.clone()),
    };
    let store = ArchiveStore::connect(&config)
        .await
        .map_err(SiteError::TransferFailed)?;
    Ok(store.with_retry(RetryPolicy {
        retries: settings.operation.upload_retries,
        cooldown: settings.operation.upload_cooldown,
    }))
}

impl Site {
    /// Detects the platform, wires its collaborators and probes the installation.
    pub async fn open(settings: &Settings, ctx: &mut OperationContext) -> Result<Self, SiteError> {
        let site_type = SiteType::detect(settings).ok_or(SiteError::NoSiteDetected)?;
        ctx.msg(format!("Site type is: {site_type}"));

        let (store, missing_storage) = match open_archive_store(settings).await {
            Ok(store) => (Some(store), Vec::new()),
            Err(SiteError::CredentialsMissing(missing)) => (None, missing),
            Err(e) => return Err(e),
        };
        let database = settings.database.as_ref().map(|db| {
            Box::new(Postgres::new(PostgresConfig {
                host: db.host.clone(),
                port: db.port,
                database: db.name.clone(),
                user: db.user.clone(),
                password: Some(db.password.clone()),
            })) as Box<dyn DatabaseBackend>
        });
        let app_name = settings.app_name.clone().unwrap_or_default();
        let parts = SiteParts {
            app_env: settings.app_env().unwrap_or(&app_name).to_string(),
            app_name,
            store,
            missing_storage,
            database,
            temp_dir: settings.temp_dir.clone(),
            operation: settings.operation.clone(),
        };
        Self::new(site_type.platform(settings), parts, ctx).await
    }

    /// Creates the private work directory and checks whether the application is installed.
    pub async fn new(
        platform: Box<dyn Platform>,
        parts: SiteParts,
        ctx: &mut OperationContext,
    ) -> Result<Self, SiteError> {
        let work_dir = parts
            .temp_dir
            .join(format!("remote-manage-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await?;
        debug!("Working directory: {}", work_dir.display());

        let mut site = Self {
            platform,
            runner: CommandRunner::new(parts.operation.poll_interval),
            store: parts.store,
            missing_storage: parts.missing_storage,
            database: parts.database,
            app_name: parts.app_name,
            app_env: parts.app_env,
            work_dir,
            operation: parts.operation,
            site_exists: false,
            in_maintenance: false,
            original_maintenance: None,
        };
        site.site_exists = site.platform.is_installed(ctx, &site.tools()).await;
        if !site.site_exists {
            ctx.msg(format!("No installed {} site found", site.site_type()));
        }
        Ok(site)
    }

    fn tools(&self) -> Tools<'_> {
        Tools {
            runner: &self.runner,
            database: self.database.as_deref(),
        }
    }

    pub fn site_type(&self) -> SiteType {
        self.platform.site_type()
    }

    pub fn site_exists(&self) -> bool {
        self.site_exists
    }

    /// Last observed maintenance flag; only meaningful after a query.
    pub fn in_maintenance_mode(&self) -> bool {
        self.in_maintenance
    }

    pub fn volumes(&self) -> &[PathBuf] {
        self.platform.volumes()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    fn require_store(&self) -> Result<&ArchiveStore, SiteError> {
        self.store
            .as_ref()
            .ok_or_else(|| SiteError::CredentialsMissing(self.missing_storage.clone()))
    }

    fn has_content(&self) -> bool {
        self.database.is_some() || !self.platform.volumes().is_empty()
    }

    pub async fn maintenance_mode(&mut self, ctx: &mut OperationContext) -> Result<bool, SiteError> {
        let enabled = self.platform.maintenance_mode(ctx, &self.tools()).await?;
        self.in_maintenance = enabled;
        Ok(enabled)
    }

    /// Queries the live flag and changes it only if needed. With `remember`,
    /// the value found first is kept so cleanup can put it back. Returns
    /// whether anything changed.
    pub async fn set_maintenance_mode(
        &mut self,
        ctx: &mut OperationContext,
        enable: bool,
        remember: bool,
    ) -> Result<bool, SiteError> {
        let current = self.maintenance_mode(ctx).await?;
        if remember && self.original_maintenance.is_none() {
            self.original_maintenance = Some(current);
        }
        if current == enable {
            debug!("Maintenance mode already {}", on_off(enable));
            return Ok(false);
        }

        let verb = if enable { "Enter" } else { "Exit" };
        ctx.msg(format!("{verb} {} maintenance mode", self.site_type()));
        self.platform
            .apply_maintenance_mode(ctx, &self.tools(), enable)
            .await?;
        self.in_maintenance = enable;
        Ok(true)
    }

    /// Puts back the flag remembered by [`Site::set_maintenance_mode`], once.
    pub async fn restore_maintenance_mode(
        &mut self,
        ctx: &mut OperationContext,
    ) -> Result<(), SiteError> {
        if let Some(original) = self.original_maintenance.take() {
            self.set_maintenance_mode(ctx, original, false).await?;
        }
        Ok(())
    }

    /// Dumps the database and archives every volume, then uploads the
    /// compressed result under its periodicity directory. Maintenance mode
    /// is returned to its prior value whatever happens, including when the
    /// operation timeout expires.
    pub async fn backup(&mut self, ctx: &mut OperationContext) -> Result<BackupArchive, SiteError> {
        ctx.msg("Backup process is running...");
        self.require_store()?;
        if !self.has_content() {
            return Err(SiteError::NothingToBackup);
        }

        let mut archive =
            BackupArchive::for_backup(&self.app_env, Local::now().naive_local(), &self.work_dir);
        let limit = self.operation.timeout;
        let result = tokio::time::timeout(limit, self.run_backup(ctx, &mut archive))
            .await
            .unwrap_or(Err(SiteError::TimedOut(limit)));
        if let Err(e) = &result {
            ctx.error(format!("Backup failed: {e}"));
        }
        self.cleanup(ctx).await;
        result.map(|()| archive)
    }

    async fn run_backup(
        &mut self,
        ctx: &mut OperationContext,
        archive: &mut BackupArchive,
    ) -> Result<(), SiteError> {
        if self.site_exists && self.set_maintenance_mode(ctx, true, true).await? {
            self.settle(ctx).await;
        }

        let captured = self.capture(ctx).await;
        // Never leave the site offline because a capture step failed.
        let reopened = self.restore_maintenance_mode(ctx).await;
        let members = captured?;

        let size = archive.package(&members).await?;
        ctx.msg(format!("Created {} ({size} bytes)", archive.filename));
        self.require_store()?
            .upload(&archive.remote_key, &archive.local_path)
            .await
            .map_err(SiteError::TransferFailed)?;
        ctx.msg(format!("Uploaded {}", archive.remote_key));
        ctx.data("filename", &archive.filename);
        ctx.data("key", &archive.remote_key);
        ctx.data("size", size);
        reopened
    }

    async fn settle(&self, ctx: &mut OperationContext) {
        if !self.operation.settle_delay {
            return;
        }
        let delay = current_settle_delay(self.platform.settle_window());
        if !delay.is_zero() {
            ctx.msg(format!(
                "Waiting {}s for background jobs to finish",
                delay.as_secs()
            ));
            tokio::time::sleep(delay).await;
        }
    }

    /// Produces the archive members in the work directory.
    async fn capture(&self, ctx: &mut OperationContext) -> Result<Vec<PathBuf>, SiteError> {
        let mut members = Vec::new();
        if let Some(database) = &self.database {
            ctx.msg("Backing up database");
            let dump = self.work_dir.join(DATABASE_DUMP);
            database
                .dump(&dump)
                .await
                .map_err(SiteError::DatabaseOperationFailed)?;
            members.push(dump);
        }
        for volume in self.platform.volumes() {
            members.push(self.archive_volume(ctx, volume).await?);
        }
        Ok(members)
    }

    async fn archive_volume(
        &self,
        ctx: &mut OperationContext,
        volume: &Path,
    ) -> Result<PathBuf, SiteError> {
        ctx.msg(format!("Backup volume {}", volume.display()));
        let failed = |reason: String| SiteError::VolumeArchiveFailed {
            volume: volume.to_path_buf(),
            reason,
        };
        let (Some(parent), Some(name), Some(member)) =
            (volume.parent(), volume.file_name(), volume_member(volume))
        else {
            return Err(failed("not a directory path".to_string()));
        };
        let dest = self.work_dir.join(member);
        let tar = Invocation::new("tar")
            .arg("cf")
            .arg(dest.display().to_string())
            .arg(name.to_string_lossy())
            .current_dir(parent)
            .long_running();
        self.runner
            .exec(ctx, &tar)
            .await
            .map_err(|e| failed(e.to_string()))?;
        Ok(dest)
    }

    /// Replaces the site's files and database with the contents of the
    /// archive stored under `identifier`. Files are mirrored before the
    /// database is dropped and reloaded. On failure, timeout included, the
    /// site stays in maintenance mode.
    pub async fn restore(
        &mut self,
        ctx: &mut OperationContext,
        identifier: &str,
        exclude: Option<&str>,
    ) -> Result<(), SiteError> {
        ctx.msg("Restore process is running...");
        self.require_store()?;
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(SiteError::MissingIdentifier);
        }
        if !self.has_content() {
            return Err(SiteError::NothingToBackup);
        }

        let limit = self.operation.timeout;
        let result = tokio::time::timeout(limit, self.run_restore(ctx, identifier, exclude))
            .await
            .unwrap_or(Err(SiteError::TimedOut(limit)));
        if let Err(e) = &result {
            ctx.error(format!("Restore failed: {e}"));
            if self.in_maintenance {
                ctx.msg("Site left in maintenance mode for inspection");
            }
        }
        self.cleanup(ctx).await;
        result
    }

    async fn run_restore(
        &mut self,
        ctx: &mut OperationContext,
        identifier: &str,
        exclude: Option<&str>,
    ) -> Result<(), SiteError> {
        if self.site_exists {
            self.set_maintenance_mode(ctx, true, false).await?;
        }

        let archive = BackupArchive::for_restore(identifier, &self.work_dir);
        ctx.msg(format!("Fetching {identifier}"));
        self.require_store()?
            .download(&archive.remote_key, &archive.local_path)
            .await
            .map_err(SiteError::TransferFailed)?;
        archive.unpack(&self.runner, ctx, &self.work_dir).await?;

        for volume in self.platform.volumes() {
            self.restore_volume(ctx, volume, exclude).await?;
        }

        if let Some(database) = &self.database {
            if self.site_exists {
                let dropped = database
                    .drop_all_tables()
                    .await
                    .map_err(SiteError::TableDropFailed)?;
                ctx.msg(format!("Dropped {dropped} database tables"));
            }
            ctx.msg("Restoring database");
            database
                .restore(&self.work_dir.join(DATABASE_DUMP))
                .await
                .map_err(SiteError::DatabaseOperationFailed)?;
        }

        self.set_maintenance_mode(ctx, false, false).await?;
        ctx.data("filename", &archive.filename);
        Ok(())
    }

    async fn restore_volume(
        &self,
        ctx: &mut OperationContext,
        volume: &Path,
        exclude: Option<&str>,
    ) -> Result<(), SiteError> {
        ctx.msg(format!("Restore volume {}", volume.display()));
        let failed = |reason: String| SiteError::VolumeRestoreFailed {
            volume: volume.to_path_buf(),
            reason,
        };
        let (Some(name), Some(member)) = (volume.file_name(), volume_member(volume)) else {
            return Err(failed("not a directory path".to_string()));
        };
        if !self.work_dir.join(&member).is_file() {
            return Err(failed(format!("{member} is not in the archive")));
        }

        let untar = Invocation::new("tar")
            .args(["xf", member.as_str()])
            .current_dir(&self.work_dir)
            .long_running();
        self.runner
            .exec(ctx, &untar)
            .await
            .map_err(|e| failed(e.to_string()))?;

        tokio::fs::create_dir_all(volume).await?;
        let mut rsync = Invocation::new("rsync").args(["-a", "--delete"]);
        for pattern in exclude
            .and_then(exclude_pattern)
            .into_iter()
            .chain(self.platform.sync_excludes(volume))
        {
            rsync = rsync.arg("--exclude").arg(pattern);
        }
        let source = self.work_dir.join(name);
        let rsync = rsync
            .arg(format!("{}/", source.display()))
            .arg(format!("{}/", volume.display()))
            .long_running();
        self.runner
            .exec(ctx, &rsync)
            .await
            .map_err(|e| failed(e.to_string()))?;
        Ok(())
    }

    /// Drops every table and empties every volume once `confirmation`
    /// matches the application name.
    pub async fn delete(
        &mut self,
        ctx: &mut OperationContext,
        confirmation: &str,
    ) -> Result<(), SiteError> {
        if self.app_name.is_empty() || confirmation.trim() != self.app_name {
            return Err(SiteError::ConfirmationMismatch);
        }
        if let Some(database) = &self.database {
            // The tables may already be gone; that is not a failure here.
            match database.drop_all_tables().await {
                Ok(dropped) => ctx.msg(format!("Dropped {dropped} database tables")),
                Err(e) => ctx.warn(format!("Could not drop database tables: {e}")),
            }
        }
        let result = self.platform.delete_files(ctx, &self.tools()).await;
        self.cleanup(ctx).await;
        result
    }

    pub async fn pm_list(
        &mut self,
        ctx: &mut OperationContext,
    ) -> Result<Vec<ModuleInfo>, SiteError> {
        self.platform.pm_list(ctx, &self.tools()).await
    }

    /// Restores any remembered maintenance flag and removes the work
    /// directory, retrying removal until the cleanup timeout.
    pub async fn cleanup(&mut self, ctx: &mut OperationContext) {
        if let Err(e) = self.restore_maintenance_mode(ctx).await {
            ctx.error(format!("Failed to restore maintenance mode: {e}"));
        }

        let deadline = Instant::now() + self.operation.cleanup_timeout;
        loop {
            match tokio::fs::remove_dir_all(&self.work_dir).await {
                Ok(()) => {
                    debug!("Removed {}", self.work_dir.display());
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) if Instant::now() >= deadline => {
                    ctx.warn(format!(
                        "Could not remove {}: {e}",
                        self.work_dir.display()
                    ));
                    break;
                }
                Err(e) => {
                    info!("Retrying removal of {}: {e}", self.work_dir.display());
                    tokio::time::sleep(CLEANUP_RETRY_DELAY).await;
                }
            }
        }
    }
}

impl Drop for Site {
    fn drop(&mut self) {
        if self.work_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.work_dir) {
                warn!("Could not remove {}: {e}", self.work_dir.display());
            }
        }
    }
}

/// rsync matches a leading `/` against the transfer root, so an absolute
/// path given to `--exclude` is reduced to its file name.
fn exclude_pattern(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Path::new(raw)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
