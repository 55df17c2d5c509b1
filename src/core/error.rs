//! Error kinds raised by the synchrony engine.

use crate::transport::SensorId;

/// Errors reported by the update pipeline.
///
/// `UnknownSensor` and `DimensionMismatch` abort an update with state
/// unchanged. `InvalidSample` and `PersistenceHandoffFailed` are non-fatal and
/// surface as warnings on the update report.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The update references an id outside the fixed registry
    UnknownSensor { sensor_id: SensorId },
    /// A non-positive or non-finite IBI, or a non-finite heart rate, was skipped
    InvalidSample { sensor_id: SensorId, value: f64 },
    /// Matrix size disagrees with the sensor count
    DimensionMismatch { expected: usize, actual: usize },
    /// The record sink refused or failed to accept the aggregate record
    PersistenceHandoffFailed { reason: String },
}

impl SyncError {
    /// Whether the error aborted the update.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::UnknownSensor { .. } | SyncError::DimensionMismatch { .. }
        )
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::UnknownSensor { sensor_id } => write!(f, "Unknown sensor: {sensor_id}"),
            SyncError::InvalidSample { sensor_id, value } => {
                write!(f, "Invalid sample {value} from sensor {sensor_id}")
            }
            SyncError::DimensionMismatch { expected, actual } => write!(
                f,
                "Dimension mismatch: expected {expected}x{expected} matrix, got size {actual}"
            ),
            SyncError::PersistenceHandoffFailed { reason } => {
                write!(f, "Record handoff failed: {reason}")
            }
        }
    }
}

impl std::error::Error for SyncError {}
