use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::room::DEFAULT_CODE_LENGTH;

pub const DEFAULT_APP_PREFIX: &str = "TOONKS";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub app_prefix: String,
    pub room_code_length: usize,
    pub connect_timeout: Duration,
    /// Hard cap on remote peers a host admits, checked before the
    /// admission predicate. `None` leaves it to the predicate.
    pub max_peers: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            app_prefix: String::from(DEFAULT_APP_PREFIX),
            room_code_length: DEFAULT_CODE_LENGTH,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_peers: None,
        }
    }
}
