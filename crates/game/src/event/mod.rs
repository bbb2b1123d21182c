mod bus;
mod types;

pub use bus::{EventBus, EventDelivery, EventReceiver};
pub use types::{GameEvent, GameEventKind};
