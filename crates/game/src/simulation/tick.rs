use std::time::{Duration, Instant};

use crate::sync::SyncConfig;

/// A periodic loop that self-throttles: the next run is due one period
/// after the previous one *started*, so time spent working is subtracted
/// and an overrun makes the next run due immediately instead of piling up.
#[derive(Debug, Clone)]
pub struct Throttle {
    period: Duration,
    next_due: Instant,
}

impl Throttle {
    /// The first run is due at `now`.
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    pub fn complete(&mut self, started: Instant, finished: Instant) {
        let work = finished.saturating_duration_since(started);
        self.next_due = finished + self.period.saturating_sub(work);
    }

    pub async fn wait(&self) {
        tokio::time::sleep_until(tokio::time::Instant::from_std(self.next_due)).await;
    }
}

/// The two synchronization loops: fast entity broadcast and slower
/// maintenance.
#[derive(Debug, Clone)]
pub struct SyncSchedule {
    pub update: Throttle,
    pub maintenance: Throttle,
}

impl SyncSchedule {
    pub fn new(config: &SyncConfig, now: Instant) -> Self {
        Self {
            update: Throttle::new(config.update_interval, now),
            maintenance: Throttle::new(config.maintenance_interval, now),
        }
    }

    pub fn next_due(&self) -> Instant {
        self.update.next_due().min(self.maintenance.next_due())
    }

    /// Sleeps until either loop is due.
    pub async fn wait(&self) {
        tokio::time::sleep_until(tokio::time::Instant::from_std(self.next_due())).await;
    }
}
