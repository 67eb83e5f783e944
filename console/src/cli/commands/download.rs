// command
// download <NAME>

// Data
// filename: local file name, the part of NAME after the last '/'
// path: where the archive was written

use clap::Args;
use common::Settings;
use log::debug;
use site::{open_archive_store, OperationContext, SiteError};

#[derive(Debug, Args)]
pub struct Download {
    /// Object key of the archive to fetch
    name: Option<String>,
}

/// Local file name for an object key.
fn local_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

impl Download {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        let store = open_archive_store(settings).await?;
        let key = self.name.as_deref().map(str::trim).unwrap_or_default();
        if key.is_empty() || local_name(key).is_empty() {
            return Err(SiteError::MissingIdentifier);
        }

        let dest = std::env::current_dir()?.join(local_name(key));
        debug!("Downloading {key} to {}", dest.display());
        store
            .download(key, &dest)
            .await
            .map_err(SiteError::TransferFailed)?;
        ctx.msg(format!("Downloaded {key}"));
        ctx.data("filename", local_name(key));
        ctx.data("path", dest.display().to_string());
        Ok(())
    }
}
