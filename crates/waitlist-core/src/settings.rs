//! Coordinator settings

use std::time::Duration;

use chrono::TimeDelta;

use crate::{Error, Result};

/// Tunables for the queue coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// How long a notified member has to claim the equipment
    pub claim_window: TimeDelta,
    /// Upper bound on a single notification delivery
    pub notify_timeout: Duration,
}

impl QueueSettings {
    pub const DEFAULT_CLAIM_WINDOW_SECS: i64 = 300;
    pub const MAX_CLAIM_WINDOW_SECS: i64 = 86_400;
    pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 5_000;

    /// Build settings from raw configuration values.
    pub fn from_secs(claim_window_secs: i64, notify_timeout_ms: u64) -> Result<Self> {
        if !(1..=Self::MAX_CLAIM_WINDOW_SECS).contains(&claim_window_secs) {
            return Err(Error::InvalidConfig(format!(
                "claim window must be between 1 and {} seconds, got {claim_window_secs}",
                Self::MAX_CLAIM_WINDOW_SECS
            )));
        }
        if notify_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "notify timeout must be greater than zero".to_string(),
            ));
        }

        let claim_window = TimeDelta::try_seconds(claim_window_secs).ok_or_else(|| {
            Error::InvalidConfig(format!("claim window out of range: {claim_window_secs}"))
        })?;

        Ok(Self {
            claim_window,
            notify_timeout: Duration::from_millis(notify_timeout_ms),
        })
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            claim_window: TimeDelta::minutes(5),
            notify_timeout: Duration::from_millis(Self::DEFAULT_NOTIFY_TIMEOUT_MS),
        }
    }
}
