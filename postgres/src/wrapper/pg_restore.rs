use crate::common::PostgresConfig;
use crate::PostgresError;
use log::{debug, error, info, warn};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// pg_restore reports this when every error it hit was skipped over.
const IGNORED_ERRORS_MARKER: &str = "errors ignored on restore";

/// Wrapper for pg_restore utility
pub struct PgRestore {
    config: PostgresConfig,
}

impl PgRestore {
    /// Create a new PgRestore instance
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    pub fn args(&self, dump_file: &Path) -> Vec<String> {
        vec![
            "--host".to_string(),
            self.config.host.clone(),
            "--port".to_string(),
            self.config.port.to_string(),
            "--username".to_string(),
            self.config.user.clone(),
            "--dbname".to_string(),
            self.config.database.clone(),
            "--no-owner".to_string(),
            "--no-privileges".to_string(),
            "--format".to_string(),
            "t".to_string(),
            dump_file.display().to_string(),
        ]
    }

    /// Restore a database from a tar-format dump file
    pub async fn restore<P: AsRef<Path>>(&self, dump_file: P) -> Result<(), PostgresError> {
        let dump_file = dump_file.as_ref();
        info!("Restoring database from dump file: {dump_file:?}");

        if !dump_file.exists() {
            return Err(PostgresError::RestoreError(format!(
                "Dump file does not exist: {dump_file:?}"
            )));
        }

        let mut cmd = Command::new("pg_restore");
        cmd.args(self.args(dump_file));

        // Set password environment variable if provided
        if let Some(password) = &self.config.password {
            cmd.env("PGPASSWORD", password);
        }

        debug!("Running pg_restore command: {cmd:?}");

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(PostgresError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if only_ignored_errors(&stderr) {
                warn!("pg_restore finished with ignored errors: {}", stderr.trim());
            } else {
                error!("pg_restore failed: {stderr}");
                return Err(PostgresError::RestoreError(format!(
                    "pg_restore failed: {stderr}"
                )));
            }
        }

        info!("Database restored successfully from dump file: {dump_file:?}");
        Ok(())
    }
}

/// True when pg_restore's output says it carried on past every error it met.
pub fn only_ignored_errors(output: &str) -> bool {
    output.contains(IGNORED_ERRORS_MARKER)
}
