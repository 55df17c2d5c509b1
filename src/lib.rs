//! Synheart Group Sync - heart-rate features and group synchrony for wearables.
//!
//! This library ingests per-sensor heart rate and inter-beat interval (IBI)
//! streams from up to a handful of wearers, derives physiological features
//! and classifies the group into soft and hard synchrony clusters.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Synheart Group Sync                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────┐   ┌──────────┐   ┌───────────┐   │
//! │  │ Transport │──▶│ TimeSeries │──▶│ Features │──▶│ Pairwise  │   │
//! │  │ (updates) │   │ (100 ring) │   │ HR, RMSSD│   │ matrices  │   │
//! │  └───────────┘   └────────────┘   └──────────┘   └───────────┘   │
//! │                                                        │         │
//! │                                                        ▼         │
//! │  ┌─────────────┐   ┌──────────────┐            ┌─────────────┐   │
//! │  │ Record sink │◀──│  Aggregate   │◀───────────│  Clusters   │   │
//! │  │ (external)  │   │   record     │            │ soft / hard │   │
//! │  └─────────────┘   └──────────────┘            └─────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use synheart_group_sync::{EngineConfig, SensorRegistry, SensorUpdate, SyncEngine};
//!
//! let registry = SensorRegistry::new(["Blue", "Green", "Red"]);
//! let mut engine = SyncEngine::new(registry, EngineConfig::default());
//!
//! let report = engine
//!     .process_update(&SensorUpdate::new("Blue", 72.0, vec![0.85, 0.83]))
//!     .expect("Blue is registered");
//!
//! assert_eq!(report.record.sensors.len(), 3);
//! assert_eq!(engine.proximity_matrix().size(), 3);
//! ```

pub mod config;
pub mod core;
pub mod sink;
pub mod transparency;
pub mod transport;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use crate::core::{
    AggregateRecord, ClusterInfo, EngineConfig, HrStatistics, PairwiseMatrix, SharedEngine,
    SyncEngine, SyncError, UpdateReport,
};
pub use sink::{CallbackSink, JsonlFileSink, MemorySink, RecordSink, SinkError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};
pub use transport::{ReplayConfig, ReplaySource, SensorId, SensorRegistry, SensorUpdate};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_record_producer() {
        let mut engine = SyncEngine::new(SensorRegistry::new(["Blue"]), EngineConfig::default());
        let report = engine
            .process_update(&SensorUpdate::new("Blue", 60.0, vec![1.0]))
            .unwrap();
        assert_eq!(report.record.producer.version, VERSION);
    }
}
