//! Core functionality for the group synchrony engine.
//!
//! This module contains:
//! - Rolling per-sensor time series
//! - Feature extraction (instantaneous HR, RMSSD, distribution statistics)
//! - Pairwise distance/proximity matrices
//! - Soft/hard cluster detection
//! - Aggregate record building
//! - The update pipeline and its shared handle

pub mod clusters;
pub mod error;
pub mod features;
pub mod matrix;
pub mod processor;
pub mod record;
pub mod shared;
pub mod timeseries;

// Re-export commonly used types
pub use clusters::{ClusterDetector, ClusterInfo, ClusterKind, ClusterTransition, DEFAULT_THRESHOLD};
pub use error::SyncError;
pub use features::{compute_hrv, compute_statistics, instantaneous_hr, HrStatistics, LastValues};
pub use matrix::{normalize_hr, proximity_score, PairwiseMatrices, PairwiseMatrix};
pub use processor::{EngineConfig, SyncEngine, UpdateReport};
pub use record::{AggregateRecord, RecordBuilder, SensorSnapshot, PRODUCER_NAME, RECORD_VERSION};
pub use shared::SharedEngine;
pub use timeseries::{TimeSeries, TimeSeriesStore, TimestampedSample, DEFAULT_CAPACITY};
