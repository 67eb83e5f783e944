//! Wait applied after entering maintenance mode so that a scheduled job
//! started at the top of the minute can finish before data is captured.

use chrono::{Timelike, Utc};
use std::time::Duration;

/// What is left of `window` once `offset_secs` (seconds past the minute)
/// have gone by; zero once the window has passed.
pub fn settle_delay(window: Duration, offset_secs: u64) -> Duration {
    Duration::from_secs(window.as_secs().saturating_sub(offset_secs))
}

pub fn current_settle_delay(window: Duration) -> Duration {
    settle_delay(window, u64::from(Utc::now().second()))
}
