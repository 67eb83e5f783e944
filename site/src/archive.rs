use crate::context::OperationContext;
use crate::error::SiteError;
use crate::periodicity::Periodicity;
use crate::runner::{CommandRunner, Invocation};
use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Name of the database dump inside every archive.
pub const DATABASE_DUMP: &str = "database.tar";

/// Archive member holding the contents of one volume.
pub fn volume_member(volume: &Path) -> Option<String> {
    volume
        .file_name()
        .map(|name| format!("{}-backup.tar", name.to_string_lossy()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn detect(filename: &str) -> Option<Self> {
        let name = filename.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }
}

/// One archive produced by a backup or consumed by a restore.
#[derive(Debug, Clone)]
pub struct BackupArchive {
    pub filename: String,
    pub remote_key: String,
    pub local_path: PathBuf,
    pub periodicity: Option<Periodicity>,
    pub size: Option<u64>,
}

impl BackupArchive {
    /// Names a new archive as `{env}-{YYYY-mm-dd_HH-MM}-{D|W|M}.tar.gz`,
    /// stored under the periodicity's directory.
    pub fn for_backup(env_tag: &str, taken_at: NaiveDateTime, work_dir: &Path) -> Self {
        let periodicity = Periodicity::for_date(taken_at.date());
        let filename = format!(
            "{env_tag}-{}-{}.tar.gz",
            taken_at.format("%Y-%m-%d_%H-%M"),
            periodicity.code()
        );
        Self {
            remote_key: format!("{}/{filename}", periodicity.directory()),
            local_path: work_dir.join(&filename),
            filename,
            periodicity: Some(periodicity),
            size: None,
        }
    }

    /// An existing archive, named by its key in the bucket.
    pub fn for_restore(remote_key: &str, work_dir: &Path) -> Self {
        let filename = remote_key
            .rsplit('/')
            .next()
            .unwrap_or(remote_key)
            .to_string();
        Self {
            remote_key: remote_key.to_string(),
            local_path: work_dir.join(&filename),
            filename,
            periodicity: None,
            size: None,
        }
    }

    /// Writes every member into the compressed archive under its file name.
    pub async fn package(&mut self, members: &[PathBuf]) -> Result<u64, SiteError> {
        if members.is_empty() {
            return Err(SiteError::NothingToBackup);
        }
        let target = self.local_path.clone();
        let members = members.to_vec();
        let size = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
            let file = File::create(&target)?;
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for member in &members {
                let name = member.file_name().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("{} has no file name", member.display()),
                    )
                })?;
                debug!("Adding {} to archive", member.display());
                builder.append_path_with_name(member, name)?;
            }
            builder.into_inner()?.finish()?;
            Ok(std::fs::metadata(&target)?.len())
        })
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??;
        self.size = Some(size);
        Ok(size)
    }

    /// Unpacks the archive into `dest`, picking the format from the file name.
    pub async fn unpack(
        &self,
        runner: &CommandRunner,
        ctx: &mut OperationContext,
        dest: &Path,
    ) -> Result<(), SiteError> {
        let extraction_failed = |reason: String| SiteError::ExtractionFailed {
            archive: self.filename.clone(),
            reason,
        };
        match ArchiveFormat::detect(&self.filename) {
            Some(ArchiveFormat::TarGz) => {
                ctx.msg(format!("Extracting {}", self.filename));
                let source = self.local_path.clone();
                let dest = dest.to_path_buf();
                tokio::task::spawn_blocking(move || -> std::io::Result<()> {
                    let mut archive = tar::Archive::new(GzDecoder::new(File::open(&source)?));
                    archive.unpack(&dest)
                })
                .await
                .map_err(|e| extraction_failed(e.to_string()))?
                .map_err(|e| extraction_failed(e.to_string()))
            }
            Some(ArchiveFormat::Zip) => {
                let unzip = Invocation::new("unzip")
                    .args(["-o", "-q"])
                    .arg(self.local_path.display().to_string())
                    .arg("-d")
                    .arg(dest.display().to_string())
                    .long_running();
                runner
                    .exec(ctx, &unzip)
                    .await
                    .map(|_| ())
                    .map_err(|e| extraction_failed(e.to_string()))
            }
            None => Err(extraction_failed(
                "unsupported archive format, expected .tar.gz, .tgz or .zip".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn backup_names_follow_the_periodicity() {
        let work = Path::new("/tmp/work");
        let daily = BackupArchive::for_backup("prod", at(2024, 6, 4, 2, 5), work);
        assert_eq!(daily.filename, "prod-2024-06-04_02-05-D.tar.gz");
        assert_eq!(daily.remote_key, "daily/prod-2024-06-04_02-05-D.tar.gz");
        assert_eq!(daily.local_path, work.join("prod-2024-06-04_02-05-D.tar.gz"));

        let monthly = BackupArchive::for_backup("qa", at(2024, 6, 1, 23, 59), work);
        assert_eq!(monthly.remote_key, "monthly/qa-2024-06-01_23-59-M.tar.gz");
    }

    #[test]
    fn restore_keeps_the_key_and_uses_the_basename_locally() {
        let archive = BackupArchive::for_restore("weekly/prod-2024-06-02_02-00-W.tar.gz", Path::new("/w"));
        assert_eq!(archive.filename, "prod-2024-06-02_02-00-W.tar.gz");
        assert_eq!(archive.local_path, Path::new("/w/prod-2024-06-02_02-00-W.tar.gz"));
        assert_eq!(archive.remote_key, "weekly/prod-2024-06-02_02-00-W.tar.gz");
    }

    #[test]
    fn formats_are_detected_from_the_extension() {
        assert_eq!(ArchiveFormat::detect("a.tar.gz"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect("A.TGZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect("export.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect("dump.sql"), None);
    }

    #[test]
    fn volume_members_use_the_directory_name() {
        assert_eq!(
            volume_member(Path::new("/opt/app-root/src/html/sites")).as_deref(),
            Some("sites-backup.tar")
        );
    }

    #[tokio::test]
    async fn package_then_unpack_restores_members() {
        let work = tempfile::tempdir().unwrap();
        let dump = work.path().join(DATABASE_DUMP);
        std::fs::write(&dump, b"dump").unwrap();
        let vol = work.path().join("sites-backup.tar");
        std::fs::write(&vol, b"files").unwrap();

        let mut archive = BackupArchive::for_backup("dev", at(2024, 6, 4, 1, 0), work.path());
        let size = archive.package(&[dump, vol]).await.unwrap();
        assert!(size > 0);

        let out = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(Duration::from_millis(50));
        let mut ctx = OperationContext::new("restore", false);
        archive.unpack(&runner, &mut ctx, out.path()).await.unwrap();
        assert_eq!(std::fs::read(out.path().join(DATABASE_DUMP)).unwrap(), b"dump");
        assert_eq!(std::fs::read(out.path().join("sites-backup.tar")).unwrap(), b"files");
    }

    #[tokio::test]
    async fn unknown_format_is_an_extraction_failure() {
        let runner = CommandRunner::new(Duration::from_millis(50));
        let mut ctx = OperationContext::new("restore", false);
        let archive = BackupArchive::for_restore("daily/dump.sql", Path::new("/tmp"));
        let err = archive
            .unpack(&runner, &mut ctx, Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::ExtractionFailed { .. }));
    }
}
