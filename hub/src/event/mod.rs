//! Event fan-out: typed events, replay ring, subscriber lifecycle.

pub mod bus;
pub mod types;

pub use bus::{EventBus, IDLE_TIMEOUT, PING_INTERVAL, REPLAY_BUFFER_SIZE, REPLAY_ON_SUBSCRIBE};
pub use types::{EventPayload, EventType, HubEvent};
