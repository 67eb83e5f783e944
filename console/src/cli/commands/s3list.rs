// command
// s3list [FILTER]

// Data
// files: [{filename, size, modified}]

use clap::Args;
use common::Settings;
use site::{open_archive_store, OperationContext, SiteError};

#[derive(Debug, Args)]
pub struct S3List {
    /// Only list keys containing this text, ignoring case
    filter: Option<String>,
}

impl S3List {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        let store = open_archive_store(settings).await?;
        let files = store
            .list(self.filter.as_deref())
            .await
            .map_err(SiteError::TransferFailed)?;
        ctx.msg(format!("{} archives in {}", files.len(), store.bucket()));
        ctx.data("files", files);
        Ok(())
    }
}
