mod config;
mod interpolation;
mod network;
mod registry;
mod tank;

pub use config::{DEFAULT_MAINTENANCE_INTERVAL, DEFAULT_UPDATE_INTERVAL, SyncConfig};
pub use interpolation::{Interpolation, MIN_INTERVAL, Transform};
pub use network::{TankNetwork, TransformSink};
pub use registry::{TankRegistry, TankUpdate};
pub use tank::{RemoteTank, TankFlags, TankSnapshot};
