use clap::Args;
use common::Settings;
use site::{OperationContext, SiteError};

#[derive(Debug, Args)]
pub struct AppName {}

impl AppName {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        ctx.data("APP_NAME", settings.app_name.as_deref().unwrap_or_default());
        Ok(())
    }
}
