use async_trait::async_trait;
use chrono::Utc;
use common::{MoodleSettings, OperationSettings};
use postgres::{DatabaseBackend, PostgresError};
use site::platform::Moodle;
use site::{OperationContext, Platform, Site, SiteError, SiteParts, SiteType, Tools};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::{ArchiveStore, Metadata, StorageError, StorageObject, StorageProvider};

#[derive(Clone, Default)]
struct FakePlatform {
    installed: bool,
    maintenance: Arc<Mutex<bool>>,
    transitions: Arc<Mutex<Vec<bool>>>,
    volumes: Vec<PathBuf>,
    settle: Duration,
}

impl FakePlatform {
    fn installed() -> Self {
        Self {
            installed: true,
            ..Self::default()
        }
    }

    fn in_maintenance(self) -> Self {
        *self.maintenance.lock().unwrap() = true;
        self
    }

    fn transitions(&self) -> Vec<bool> {
        self.transitions.lock().unwrap().clone()
    }

    fn maintenance(&self) -> bool {
        *self.maintenance.lock().unwrap()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    fn site_type(&self) -> SiteType {
        SiteType::Drupal
    }

    fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    fn settle_window(&self) -> Duration {
        self.settle
    }

    async fn is_installed(&self, _ctx: &mut OperationContext, _tools: &Tools<'_>) -> bool {
        self.installed
    }

    async fn maintenance_mode(
        &self,
        _ctx: &mut OperationContext,
        _tools: &Tools<'_>,
    ) -> Result<bool, SiteError> {
        Ok(self.maintenance())
    }

    async fn apply_maintenance_mode(
        &self,
        _ctx: &mut OperationContext,
        _tools: &Tools<'_>,
        enable: bool,
    ) -> Result<(), SiteError> {
        *self.maintenance.lock().unwrap() = enable;
        self.transitions.lock().unwrap().push(enable);
        Ok(())
    }

    async fn delete_files(
        &self,
        _ctx: &mut OperationContext,
        _tools: &Tools<'_>,
    ) -> Result<(), SiteError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeDatabase {
    fail_dump: bool,
    slow_dump: Option<Duration>,
    fail_drop: bool,
    fail_restore: bool,
    drops: Arc<AtomicU32>,
    restored: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl DatabaseBackend for FakeDatabase {
    async fn dump(&self, dest: &Path) -> Result<(), PostgresError> {
        if let Some(delay) = self.slow_dump {
            tokio::time::sleep(delay).await;
        }
        if self.fail_dump {
            return Err(PostgresError::DumpError("pg_dump: connection refused".into()));
        }
        std::fs::write(dest, "dump of site")?;
        Ok(())
    }

    async fn restore(&self, src: &Path) -> Result<(), PostgresError> {
        if self.fail_restore {
            return Err(PostgresError::RestoreError("pg_restore: invalid input".into()));
        }
        let content = std::fs::read_to_string(src)?;
        *self.restored.lock().unwrap() = Some(content);
        Ok(())
    }

    async fn drop_all_tables(&self) -> Result<u64, PostgresError> {
        self.drops.fetch_add(1, Ordering::SeqCst);
        if self.fail_drop {
            return Err(PostgresError::QueryError("relation is locked".into()));
        }
        Ok(3)
    }

    async fn is_reachable(&self) -> bool {
        true
    }

    async fn query_text(&self, _sql: &str) -> Result<Option<String>, PostgresError> {
        Ok(None)
    }
}

#[derive(Clone, Default)]
struct MemoryProvider {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        _prefix: Option<&str>,
    ) -> Result<Vec<StorageObject>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .map(|(k, v)| StorageObject {
                key: k.clone(),
                size: v.len() as u64,
                last_modified: Some(Utc::now()),
                etag: None,
            })
            .collect())
    }

    async fn upload_file(
        &self,
        _bucket: &str,
        key: &str,
        file_path: &Path,
        _content_type: Option<&str>,
        _metadata: Option<Metadata>,
    ) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = std::fs::read(file_path)?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn download_file(
        &self,
        _bucket: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let data = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        std::fs::write(file_path, data)?;
        Ok(())
    }

    async fn object_exists(&self, _bucket: &str, key: &str) -> Result<bool, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

fn operation() -> OperationSettings {
    OperationSettings {
        timeout: Duration::from_secs(60),
        poll_interval: Duration::from_millis(50),
        upload_retries: 0,
        upload_cooldown: Duration::from_millis(1),
        cleanup_timeout: Duration::from_secs(1),
        settle_delay: false,
    }
}

fn parts(
    temp: &Path,
    provider: Option<&MemoryProvider>,
    database: Option<&FakeDatabase>,
) -> SiteParts {
    SiteParts {
        app_name: "demo".into(),
        app_env: "prod".into(),
        store: provider.map(|p| ArchiveStore::with_provider(Box::new(p.clone()), "backups")),
        missing_storage: if provider.is_some() {
            Vec::new()
        } else {
            vec!["AWS_S3_BUCKET".into()]
        },
        database: database.map(|db| Box::new(db.clone()) as Box<dyn DatabaseBackend>),
        temp_dir: temp.to_path_buf(),
        operation: operation(),
    }
}

async fn open(
    platform: &FakePlatform,
    parts: SiteParts,
    ctx: &mut OperationContext,
) -> Site {
    let _ = env_logger::builder().is_test(true).try_init();
    Site::new(Box::new(platform.clone()), parts, ctx)
        .await
        .unwrap()
}

fn work_dirs(temp: &Path) -> usize {
    std::fs::read_dir(temp).unwrap().count()
}

/// rsync is needed to mirror volumes back; hosts without it skip those tests.
fn have_rsync() -> bool {
    let found = std::process::Command::new("rsync")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success());
    if !found {
        eprintln!("rsync not installed, skipping");
    }
    found
}

/// Backs up `platform` with a fake database and returns the stored key.
async fn stored_backup(
    temp: &Path,
    platform: &FakePlatform,
    provider: &MemoryProvider,
) -> String {
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("backup", false);
    let mut site = open(platform, parts(temp, Some(provider), Some(&db)), &mut ctx).await;
    site.backup(&mut ctx).await.unwrap().remote_key
}

#[tokio::test]
async fn database_backup_is_uploaded_and_maintenance_is_put_back() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("backup", false);

    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let archive = site.backup(&mut ctx).await.unwrap();

    assert!(archive.filename.starts_with("prod-"));
    assert!(archive.filename.ends_with(".tar.gz"));
    assert!(provider.objects.lock().unwrap().contains_key(&archive.remote_key));
    assert_eq!(platform.transitions(), vec![true, false]);
    assert!(!platform.maintenance());
    assert_eq!(ctx.get_data("key").unwrap(), archive.remote_key.as_str());
    assert_eq!(work_dirs(temp.path()), 0);
}

#[tokio::test]
async fn backup_leaves_existing_maintenance_mode_on() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed().in_maintenance();
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("backup", false);

    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    site.backup(&mut ctx).await.unwrap();

    assert!(platform.transitions().is_empty());
    assert!(platform.maintenance());
}

#[tokio::test]
async fn failed_dump_still_restores_maintenance_and_cleans_up() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let db = FakeDatabase {
        fail_dump: true,
        ..FakeDatabase::default()
    };
    let mut ctx = OperationContext::new("backup", false);

    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let err = site.backup(&mut ctx).await.unwrap_err();

    assert!(matches!(err, SiteError::DatabaseOperationFailed(_)));
    assert_eq!(platform.transitions(), vec![true, false]);
    assert!(provider.objects.lock().unwrap().is_empty());
    assert_eq!(work_dirs(temp.path()), 0);
}

#[tokio::test]
async fn nothing_to_back_up_never_touches_maintenance() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let mut ctx = OperationContext::new("backup", false);

    let mut site = open(&platform, parts(temp.path(), Some(&provider), None), &mut ctx).await;
    let err = site.backup(&mut ctx).await.unwrap_err();

    assert!(matches!(err, SiteError::NothingToBackup));
    assert!(platform.transitions().is_empty());
}

#[tokio::test]
async fn backup_without_credentials_names_the_missing_variables() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("backup", false);

    let mut site = open(&platform, parts(temp.path(), None, Some(&db)), &mut ctx).await;
    match site.backup(&mut ctx).await {
        Err(SiteError::CredentialsMissing(missing)) => assert_eq!(missing, vec!["AWS_S3_BUCKET"]),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(platform.transitions().is_empty());
}

#[tokio::test]
async fn blank_identifier_is_rejected_before_any_transfer() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("restore", false);

    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let err = site.restore(&mut ctx, "   ", None).await.unwrap_err();

    assert!(matches!(err, SiteError::MissingIdentifier));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(platform.transitions().is_empty());
}

#[tokio::test]
async fn restore_reloads_the_database_and_leaves_maintenance() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();

    let mut ctx = OperationContext::new("backup", false);
    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let archive = site.backup(&mut ctx).await.unwrap();
    drop(site);

    let mut ctx = OperationContext::new("restore", false);
    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    site.restore(&mut ctx, &archive.remote_key, None).await.unwrap();

    assert_eq!(db.drops.load(Ordering::SeqCst), 1);
    assert_eq!(db.restored.lock().unwrap().as_deref(), Some("dump of site"));
    assert!(!platform.maintenance());
    assert_eq!(platform.transitions(), vec![true, false, true, false]);
    assert_eq!(work_dirs(temp.path()), 0);
}

#[tokio::test]
async fn restore_on_fresh_site_skips_dropping_tables() {
    let temp = tempfile::tempdir().unwrap();
    let installed = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();

    let mut ctx = OperationContext::new("backup", false);
    let mut site = open(&installed, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let archive = site.backup(&mut ctx).await.unwrap();
    drop(site);

    let fresh = FakePlatform::default();
    let mut ctx = OperationContext::new("restore", false);
    let mut site = open(&fresh, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    assert!(!site.site_exists());
    site.restore(&mut ctx, &archive.remote_key, None).await.unwrap();

    assert_eq!(db.drops.load(Ordering::SeqCst), 0);
    assert!(db.restored.lock().unwrap().is_some());
}

#[tokio::test]
async fn missing_archive_leaves_the_site_in_maintenance() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("restore", false);

    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let err = site
        .restore(&mut ctx, "daily/prod-2024-06-04_02-00-D.tar.gz", None)
        .await
        .unwrap_err();

    assert!(matches!(err, SiteError::TransferFailed(StorageError::NotFound(_))));
    assert!(platform.maintenance());
    assert_eq!(db.drops.load(Ordering::SeqCst), 0);
    assert_eq!(work_dirs(temp.path()), 0);
}

#[tokio::test]
async fn delete_requires_the_application_name() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("delete", false);

    let mut site = open(&platform, parts(temp.path(), None, Some(&db)), &mut ctx).await;
    let err = site.delete(&mut ctx, "other").await.unwrap_err();
    assert!(matches!(err, SiteError::ConfirmationMismatch));
    assert_eq!(db.drops.load(Ordering::SeqCst), 0);

    site.delete(&mut ctx, "demo").await.unwrap();
    assert_eq!(db.drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn volumes_are_archived_with_tar() {
    let temp = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let volume = data.path().join("files");
    std::fs::create_dir_all(volume.join("styles")).unwrap();
    std::fs::write(volume.join("styles/logo.png"), "png").unwrap();

    let platform = FakePlatform {
        volumes: vec![volume],
        ..FakePlatform::installed()
    };
    let provider = MemoryProvider::default();
    let mut ctx = OperationContext::new("backup", false);

    let mut site = open(&platform, parts(temp.path(), Some(&provider), None), &mut ctx).await;
    let archive = site.backup(&mut ctx).await.unwrap();

    let objects = provider.objects.lock().unwrap();
    let bytes = objects.get(&archive.remote_key).unwrap();
    let mut outer = tar::Archive::new(flate2::read::GzDecoder::new(bytes.as_slice()));
    let names: Vec<String> = outer
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().display().to_string())
        .collect();
    assert_eq!(names, vec!["files-backup.tar"]);
}

#[tokio::test]
async fn timed_out_backup_still_restores_maintenance() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let db = FakeDatabase {
        slow_dump: Some(Duration::from_secs(5)),
        ..FakeDatabase::default()
    };
    let mut ctx = OperationContext::new("backup", false);
    let mut parts = parts(temp.path(), Some(&provider), Some(&db));
    parts.operation.timeout = Duration::from_millis(300);

    let mut site = open(&platform, parts, &mut ctx).await;
    let err = site.backup(&mut ctx).await.unwrap_err();

    assert!(matches!(err, SiteError::TimedOut(_)));
    assert_eq!(platform.transitions(), vec![true, false]);
    assert!(!platform.maintenance());
    assert!(provider.objects.lock().unwrap().is_empty());
    assert_eq!(work_dirs(temp.path()), 0);
}

#[tokio::test]
async fn failed_volume_archive_aborts_backup_and_restores_maintenance() {
    let temp = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let platform = FakePlatform {
        volumes: vec![data.path().join("missing")],
        ..FakePlatform::installed()
    };
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("backup", false);

    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let err = site.backup(&mut ctx).await.unwrap_err();

    assert!(matches!(err, SiteError::VolumeArchiveFailed { .. }));
    assert_eq!(platform.transitions(), vec![true, false]);
    assert!(provider.objects.lock().unwrap().is_empty());
    assert_eq!(work_dirs(temp.path()), 0);
}

#[tokio::test]
async fn failed_table_drop_leaves_the_site_in_maintenance() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let key = stored_backup(temp.path(), &platform, &provider).await;

    let db = FakeDatabase {
        fail_drop: true,
        ..FakeDatabase::default()
    };
    let mut ctx = OperationContext::new("restore", false);
    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let err = site.restore(&mut ctx, &key, None).await.unwrap_err();

    assert!(matches!(err, SiteError::TableDropFailed(_)));
    assert!(platform.maintenance());
    assert!(db.restored.lock().unwrap().is_none());
    assert_eq!(work_dirs(temp.path()), 0);
}

#[tokio::test]
async fn failed_database_reload_leaves_the_site_in_maintenance() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform::installed();
    let provider = MemoryProvider::default();
    let key = stored_backup(temp.path(), &platform, &provider).await;

    let db = FakeDatabase {
        fail_restore: true,
        ..FakeDatabase::default()
    };
    let mut ctx = OperationContext::new("restore", false);
    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    let err = site.restore(&mut ctx, &key, None).await.unwrap_err();

    assert!(matches!(err, SiteError::DatabaseOperationFailed(_)));
    assert_eq!(db.drops.load(Ordering::SeqCst), 1);
    assert!(platform.maintenance());
    assert_eq!(platform.transitions().last(), Some(&true));
}

#[tokio::test(start_paused = true)]
async fn settle_delay_follows_entering_maintenance() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform {
        settle: Duration::from_secs(300),
        ..FakePlatform::installed()
    };
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("backup", false);
    let mut parts = parts(temp.path(), Some(&provider), Some(&db));
    parts.operation.settle_delay = true;
    parts.operation.timeout = Duration::from_secs(3600);

    let mut site = open(&platform, parts, &mut ctx).await;
    let started = tokio::time::Instant::now();
    site.backup(&mut ctx).await.unwrap();

    // 300s window less at most 59s already past the minute.
    assert!(started.elapsed() >= Duration::from_secs(241));
}

#[tokio::test(start_paused = true)]
async fn settle_delay_is_skipped_when_maintenance_was_already_on() {
    let temp = tempfile::tempdir().unwrap();
    let platform = FakePlatform {
        settle: Duration::from_secs(300),
        ..FakePlatform::installed().in_maintenance()
    };
    let provider = MemoryProvider::default();
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("backup", false);
    let mut parts = parts(temp.path(), Some(&provider), Some(&db));
    parts.operation.settle_delay = true;
    parts.operation.timeout = Duration::from_secs(3600);

    let mut site = open(&platform, parts, &mut ctx).await;
    let started = tokio::time::Instant::now();
    site.backup(&mut ctx).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(platform.transitions().is_empty());
}

#[tokio::test]
async fn restore_mirrors_volumes_and_keeps_the_excluded_log() {
    if !have_rsync() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let volume = data.path().join("sites");
    std::fs::create_dir_all(volume.join("default")).unwrap();
    std::fs::write(volume.join("default/settings.php"), "<?php // saved").unwrap();

    let platform = FakePlatform {
        volumes: vec![volume.clone()],
        ..FakePlatform::installed()
    };
    let provider = MemoryProvider::default();
    let key = stored_backup(temp.path(), &platform, &provider).await;

    std::fs::write(volume.join("default/settings.php"), "<?php // edited").unwrap();
    std::fs::write(volume.join("stale.txt"), "not in the archive").unwrap();
    let log = volume.join("rmanage.log");
    std::fs::write(&log, "restore in progress").unwrap();

    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("restore", false);
    let mut site = open(&platform, parts(temp.path(), Some(&provider), Some(&db)), &mut ctx).await;
    site.restore(&mut ctx, &key, Some(log.to_str().unwrap()))
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(volume.join("default/settings.php")).unwrap(),
        "<?php // saved"
    );
    assert!(!volume.join("stale.txt").exists());
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "restore in progress");
    assert!(!platform.maintenance());
}

#[tokio::test]
async fn moodle_restore_keeps_the_maintenance_marker_until_it_finishes() {
    if !have_rsync() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let settings = MoodleSettings {
        lang_marker: root.path().join("src/lang/en/moodle.php"),
        data_dir: root.path().join("moodledata"),
        code_dir: root.path().join("src"),
        // Every admin CLI call succeeds and reports nothing.
        php: "true".into(),
        maintenance_page: None,
    };
    std::fs::create_dir_all(&settings.data_dir).unwrap();
    std::fs::create_dir_all(settings.code_dir.join("lang/en")).unwrap();
    std::fs::write(&settings.lang_marker, "<?php").unwrap();
    let provider = MemoryProvider::default();

    // Taken before installation, so the archive has no marker in it.
    let db = FakeDatabase::default();
    let mut ctx = OperationContext::new("backup", false);
    let mut site = Site::new(
        Box::new(Moodle::new(settings.clone())),
        parts(temp.path(), Some(&provider), Some(&db)),
        &mut ctx,
    )
    .await
    .unwrap();
    assert!(!site.site_exists());
    let key = site.backup(&mut ctx).await.unwrap().remote_key;
    drop(site);

    std::fs::write(settings.data_dir.join(".htaccess"), "deny from all").unwrap();
    let db = FakeDatabase {
        fail_drop: true,
        ..FakeDatabase::default()
    };
    let mut ctx = OperationContext::new("restore", false);
    let mut site = Site::new(
        Box::new(Moodle::new(settings.clone())),
        parts(temp.path(), Some(&provider), Some(&db)),
        &mut ctx,
    )
    .await
    .unwrap();
    assert!(site.site_exists());
    let err = site.restore(&mut ctx, &key, None).await.unwrap_err();

    assert!(matches!(err, SiteError::TableDropFailed(_)));
    assert!(settings.data_dir.join("climaintenance.html").is_file());
    assert!(site.maintenance_mode(&mut ctx).await.unwrap());
}
