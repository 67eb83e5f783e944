// command
// delete <APP_NAME>

use clap::Args;
use common::Settings;
use site::{OperationContext, Site, SiteError};

#[derive(Debug, Args)]
pub struct Delete {
    /// Must repeat the configured application name
    app_name: Option<String>,
}

impl Delete {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        let mut site = Site::open(settings, ctx).await?;
        site.delete(ctx, self.app_name.as_deref().unwrap_or_default())
            .await
    }
}
