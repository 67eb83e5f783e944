use clap::Args;
use common::Settings;
use site::{OperationContext, Site, SiteError};

#[derive(Debug, Args)]
pub struct PmList {}

impl PmList {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        let mut site = Site::open(settings, ctx).await?;
        let result = site.pm_list(ctx).await;
        site.cleanup(ctx).await;
        let modules = result?;
        ctx.msg(format!("Found {} modules", modules.len()));
        ctx.data("modules", modules);
        Ok(())
    }
}
