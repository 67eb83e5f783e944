//! Site lifecycle for hosted web applications.
//!
//! A [`Site`] wraps one detected [`Platform`] together with its database and
//! archive store, and owns the backup and restore sequences so that every
//! platform shares the same ordering and failure handling.

pub mod archive;
pub mod context;
pub mod disk;
pub mod error;
pub mod periodicity;
pub mod platform;
pub mod runner;
pub mod settle;
mod site;

pub use archive::{ArchiveFormat, BackupArchive, DATABASE_DUMP};
pub use context::{OperationContext, Report};
pub use error::{ErrorCategory, SiteError};
pub use periodicity::Periodicity;
pub use platform::{ModuleInfo, Platform, SiteType, Tools};
pub use runner::{CommandOutput, CommandRunner, Invocation};
pub use site::{open_archive_store, Site, SiteParts};
