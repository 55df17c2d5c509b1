//! Transparency module for the group synchrony engine.
//!
//! Tracks what the engine ingested and emitted during a session.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
