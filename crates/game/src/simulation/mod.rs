mod tick;

pub use tick::{SyncSchedule, Throttle};
