//! Transport boundary for the group synchrony engine.
//!
//! Live wireless transports are external; this module defines what they hand
//! over and provides a file replay source that feeds the same update queue.

pub mod replay;
pub mod types;

// Re-export commonly used types
pub use replay::{
    parse_update_line, update_channel, ReplayConfig, ReplaySource, TransportError,
    DEFAULT_QUEUE_CAPACITY,
};
pub use types::{SensorId, SensorRegistry, SensorUpdate};
