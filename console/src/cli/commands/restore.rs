// options
// exclude: path (file kept in every volume, matched by file name)

// command
// restore [OPTIONS] <IDENTIFIER>

use clap::Args;
use common::Settings;
use site::{OperationContext, Site, SiteError};

#[derive(Debug, Args)]
pub struct Restore {
    /// Object key of the archive, e.g. daily/prod-2024-06-04_02-00-D.tar.gz
    identifier: Option<String>,

    /// File kept in every volume, usually the active log; only its file name is matched
    #[clap(long)]
    exclude: Option<String>,
}

impl Restore {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        let mut site = Site::open(settings, ctx).await?;
        site.restore(
            ctx,
            self.identifier.as_deref().unwrap_or_default(),
            self.exclude.as_deref(),
        )
        .await
    }
}
