// options
// format: string (bytes, human (default))

// command
// space [OPTIONS] [VOLUME]...

use clap::Args;
use common::Settings;
use site::disk::{volume_space, SpaceFormat};
use site::{OperationContext, Site, SiteError};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct Space {
    /// Volumes to inspect; defaults to the volumes of the detected site
    volumes: Vec<PathBuf>,

    /// Output format (bytes, human)
    #[clap(long, default_value = "human")]
    format: String,
}

impl Space {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        let format: SpaceFormat = self.format.parse()?;
        let volumes = if self.volumes.is_empty() {
            let mut site = Site::open(settings, ctx).await?;
            let volumes = site.volumes().to_vec();
            site.cleanup(ctx).await;
            volumes
        } else {
            self.volumes
        };

        let spaces = volumes
            .iter()
            .map(|volume| volume_space(volume, format))
            .collect::<Result<Vec<_>, _>>()?;
        ctx.data("volumes", spaces);
        Ok(())
    }
}
