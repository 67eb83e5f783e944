use postgres::PostgresError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Archive storage credentials are missing: {}", .0.join(", "))]
    CredentialsMissing(Vec<String>),

    #[error("Missing archive filename")]
    MissingIdentifier,

    #[error("Neither a database nor any volumes are configured")]
    NothingToBackup,

    #[error("No supported site was detected on this host")]
    NoSiteDetected,

    #[error("Database operation failed: {0}")]
    DatabaseOperationFailed(#[source] PostgresError),

    #[error("Failed to archive volume {}: {reason}", .volume.display())]
    VolumeArchiveFailed { volume: PathBuf, reason: String },

    #[error("Failed to restore volume {}: {reason}", .volume.display())]
    VolumeRestoreFailed { volume: PathBuf, reason: String },

    #[error("Archive transfer failed: {0}")]
    TransferFailed(#[source] StorageError),

    #[error("Failed to extract {archive}: {reason}")]
    ExtractionFailed { archive: String, reason: String },

    #[error("Failed to drop database tables: {0}")]
    TableDropFailed(#[source] PostgresError),

    #[error("Command `{command}` failed with exit code {code}")]
    CommandExecutionFailed { command: String, code: i32 },

    #[error("Command `{0}` stopped responding and was terminated")]
    CommandStopped(String),

    #[error("Operation did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Unable to determine maintenance mode: {0}")]
    MaintenanceModeFailed(String),

    #[error("{0} is not supported for this site type")]
    Unsupported(String),

    #[error("Invalid or missing app-name. Are you sure that you are on the right server?")]
    ConfirmationMismatch,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad failure classes used when reporting an operation's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Nothing was changed: the request could not start.
    Precondition,
    ExternalCommand,
    ExternalService,
    /// A destructive step stopped partway.
    Consistency,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Precondition => "precondition",
            ErrorCategory::ExternalCommand => "external_command",
            ErrorCategory::ExternalService => "external_service",
            ErrorCategory::Consistency => "consistency",
        };
        f.write_str(name)
    }
}

impl SiteError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SiteError::CredentialsMissing(_)
            | SiteError::MissingIdentifier
            | SiteError::NothingToBackup
            | SiteError::NoSiteDetected
            | SiteError::Unsupported(_)
            | SiteError::ConfirmationMismatch
            | SiteError::InvalidArgument(_) => ErrorCategory::Precondition,
            SiteError::CommandExecutionFailed { .. }
            | SiteError::CommandStopped(_)
            | SiteError::TimedOut(_)
            | SiteError::VolumeArchiveFailed { .. }
            | SiteError::ExtractionFailed { .. }
            | SiteError::MaintenanceModeFailed(_) => ErrorCategory::ExternalCommand,
            SiteError::DatabaseOperationFailed(_)
            | SiteError::TransferFailed(_)
            | SiteError::Io(_) => ErrorCategory::ExternalService,
            SiteError::TableDropFailed(_) | SiteError::VolumeRestoreFailed { .. } => {
                ErrorCategory::Consistency
            }
        }
    }
}
