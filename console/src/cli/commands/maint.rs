// command
// maint [on|off]

// Data
// maintMode: on|off, read back after any change

use clap::Args;
use common::Settings;
use site::{OperationContext, Site, SiteError};

#[derive(Debug, Args)]
pub struct Maint {
    /// on or off; anything else only queries
    state: Option<String>,
}

/// The requested state, or `None` for a query.
fn requested(state: Option<&str>) -> Option<bool> {
    match state.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

impl Maint {
    pub async fn run(self, settings: &Settings, ctx: &mut OperationContext) -> Result<(), SiteError> {
        let mut site = Site::open(settings, ctx).await?;
        let result = Self::apply(&mut site, self.state.as_deref(), ctx).await;
        site.cleanup(ctx).await;
        let enabled = result?;
        ctx.data("maintMode", if enabled { "on" } else { "off" });
        Ok(())
    }

    async fn apply(
        site: &mut Site,
        state: Option<&str>,
        ctx: &mut OperationContext,
    ) -> Result<bool, SiteError> {
        match requested(state) {
            Some(enable) => {
                if !site.set_maintenance_mode(ctx, enable, false).await? {
                    ctx.msg("Maintenance mode unchanged");
                }
            }
            None => {
                if let Some(other) = state.filter(|s| !s.trim().is_empty()) {
                    ctx.warn(format!("Unknown maintenance state '{other}', querying instead"));
                }
            }
        }
        site.maintenance_mode(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_on_and_off_change_the_state() {
        assert_eq!(requested(Some("on")), Some(true));
        assert_eq!(requested(Some(" OFF ")), Some(false));
        assert_eq!(requested(Some("status")), None);
        assert_eq!(requested(None), None);
    }
}
