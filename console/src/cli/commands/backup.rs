// command
// backup

// Data
// filename: archive file name
// key: object key in the bucket
// size: archive size in bytes

use clap::Args;
use common::Settings;
use site::{OperationContext, Site, SiteError};

#[derive(Debug, Args)]
pub struct Backup {}

impl Backup {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        let mut site = Site::open(settings, ctx).await?;
        site.backup(ctx).await?;
        Ok(())
    }
}
