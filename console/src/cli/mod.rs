//! The operations remote-manage exposes, one clap subcommand each.

pub mod commands;

use clap::Subcommand;
use common::Settings;
use site::{OperationContext, SiteError};

use commands::{
    app_name::AppName, backup::Backup, delete::Delete, download::Download, maint::Maint,
    pmlist::PmList, restore::Restore, s3list::S3List, space::Space,
};

#[derive(Subcommand, Debug)]
pub enum Operation {
    /// Back up the database and volumes to the archive store
    Backup(Backup),
    /// Replace the site with the contents of a stored archive
    Restore(Restore),
    /// Fetch a stored archive into the current directory
    Download(Download),
    /// Drop every table and empty every volume
    Delete(Delete),
    /// List installed modules
    #[clap(name = "pmlist")]
    PmList(PmList),
    /// Print the configured application name
    #[clap(name = "app-name")]
    AppName(AppName),
    /// List archives in the bucket
    #[clap(name = "s3list")]
    S3List(S3List),
    /// Report disk usage of the site volumes
    Space(Space),
    /// Query or switch maintenance mode
    Maint(Maint),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Backup(_) => "backup",
            Operation::Restore(_) => "restore",
            Operation::Download(_) => "download",
            Operation::Delete(_) => "delete",
            Operation::PmList(_) => "pmlist",
            Operation::AppName(_) => "app-name",
            Operation::S3List(_) => "s3list",
            Operation::Space(_) => "space",
            Operation::Maint(_) => "maint",
        }
    }
}

/// Runs one operation to completion. Everything the caller reports is
/// accumulated in `ctx`.
pub async fn dispatch(
    operation: Operation,
    settings: &Settings,
    ctx: &mut OperationContext,
) -> Result<(), SiteError> {
    match operation {
        Operation::Backup(backup) => backup.run(settings, ctx).await,
        Operation::Restore(restore) => restore.run(settings, ctx).await,
        Operation::Download(download) => download.run(settings, ctx).await,
        Operation::Delete(delete) => delete.run(settings, ctx).await,
        Operation::PmList(pmlist) => pmlist.run(settings, ctx).await,
        Operation::AppName(app_name) => app_name.run(settings, ctx).await,
        Operation::S3List(s3list) => s3list.run(settings, ctx).await,
        Operation::Space(space) => space.run(settings, ctx).await,
        Operation::Maint(maint) => maint.run(settings, ctx).await,
    }
}
