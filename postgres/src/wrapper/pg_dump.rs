use crate::common::PostgresConfig;
use crate::PostgresError;
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Format options for pg_dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgDumpFormat {
    Plain,
    Custom,
    Tar,
}

impl PgDumpFormat {
    fn as_str(&self) -> &'static str {
        match self {
            PgDumpFormat::Plain => "p",
            PgDumpFormat::Custom => "c",
            PgDumpFormat::Tar => "t",
        }
    }
}

/// Options for pg_dump command
#[derive(Debug, Clone)]
pub struct PgDumpOptions {
    pub file: PathBuf,
    pub format: PgDumpFormat,
    pub no_owner: bool,
    pub verbose: bool,
}

impl PgDumpOptions {
    /// Tar-format dump without ownership, the layout site archives carry.
    pub fn tar(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            format: PgDumpFormat::Tar,
            no_owner: true,
            verbose: false,
        }
    }
}

/// Wrapper for pg_dump command
pub struct PgDump {
    config: PostgresConfig,
}

impl PgDump {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    /// Command line arguments, without the password which travels in `PGPASSWORD`.
    pub fn args(&self, options: &PgDumpOptions) -> Vec<String> {
        let mut args = vec![
            "--host".to_string(),
            self.config.host.clone(),
            "--port".to_string(),
            self.config.port.to_string(),
            "--username".to_string(),
            self.config.user.clone(),
            "--dbname".to_string(),
            self.config.database.clone(),
            "--file".to_string(),
            options.file.display().to_string(),
            "--format".to_string(),
            options.format.as_str().to_string(),
        ];

        if options.no_owner {
            args.push("--no-owner".to_string());
        }

        if options.verbose {
            args.push("--verbose".to_string());
        }

        args
    }

    /// Run pg_dump with the given options
    pub async fn run(&self, options: &PgDumpOptions) -> Result<(), PostgresError> {
        if let Some(parent) = options.file.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !Path::new(parent).is_dir() {
                return Err(PostgresError::DumpError(format!(
                    "Destination directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        let mut cmd = Command::new("pg_dump");
        cmd.args(self.args(options));

        // Set PGPASSWORD environment variable
        if let Some(password) = &self.config.password {
            cmd.env("PGPASSWORD", password);
        }

        debug!("Running pg_dump command: {cmd:?}");

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PostgresError::DumpError(format!("Failed to execute pg_dump: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("pg_dump failed: {stderr}");
            return Err(PostgresError::DumpError(format!("pg_dump failed: {stderr}")));
        }

        info!("pg_dump completed successfully: {}", options.file.display());
        Ok(())
    }
}
