use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Period of the owner's snapshot broadcast.
    pub update_interval: Duration,
    /// Period of roster reconciliation and other slow housekeeping.
    pub maintenance_interval: Duration,
    /// Interpolation interval assumed until two snapshots have arrived.
    pub initial_interval: Duration,
    /// Upper bound for the measured interval, so a stalled peer doesn't
    /// crawl toward its next position for seconds.
    pub max_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            initial_interval: DEFAULT_UPDATE_INTERVAL,
            max_interval: Duration::from_secs(1),
        }
    }
}
