//! Thread-safe handle around a single engine.
//!
//! Updates take the write lock; queries take the read lock and return owned
//! snapshots, so no caller ever holds a live reference into engine state.

use crate::core::clusters::ClusterInfo;
use crate::core::error::SyncError;
use crate::core::features::HrStatistics;
use crate::core::matrix::PairwiseMatrix;
use crate::core::processor::{SyncEngine, UpdateReport};
use crate::transparency::TransparencyStats;
use crate::transport::{SensorId, SensorUpdate};
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cloneable handle sharing one engine between a writer and many readers.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<RwLock<SyncEngine>>,
}

impl SharedEngine {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    // Updates commit atomically, so a poisoned lock still guards consistent state.
    fn read(&self) -> RwLockReadGuard<'_, SyncEngine> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SyncEngine> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Process an update under the write lock.
    pub fn update(&self, update: &SensorUpdate) -> Result<UpdateReport, SyncError> {
        self.write().process_update(update)
    }

    pub fn update_at(
        &self,
        update: &SensorUpdate,
        now: DateTime<Utc>,
    ) -> Result<UpdateReport, SyncError> {
        self.write().process_update_at(update, now)
    }

    pub fn reset_session(&self) {
        self.write().reset_session();
    }

    /// Run an arbitrary read-only query under the read lock.
    pub fn with_engine<R>(&self, f: impl FnOnce(&SyncEngine) -> R) -> R {
        f(&self.read())
    }

    pub fn sensor_ids(&self) -> Vec<SensorId> {
        self.read().sensor_ids().to_vec()
    }

    pub fn recent_hr(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        self.read().recent_hr(sensor_id, n)
    }

    pub fn recent_hrv(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        self.read().recent_hrv(sensor_id, n)
    }

    pub fn recent_ibi(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        self.read().recent_ibi(sensor_id, n)
    }

    pub fn statistics(&self, sensor_id: &SensorId) -> Result<Option<HrStatistics>, SyncError> {
        self.read().statistics(sensor_id)
    }

    pub fn distance_matrix(&self) -> PairwiseMatrix {
        self.read().distance_matrix().clone()
    }

    pub fn proximity_matrix(&self) -> PairwiseMatrix {
        self.read().proximity_matrix().clone()
    }

    pub fn proximity_score(&self) -> f64 {
        self.read().proximity_score()
    }

    pub fn soft_clusters(&self) -> Vec<ClusterInfo> {
        self.read().soft_clusters().to_vec()
    }

    pub fn hard_clusters(&self) -> Vec<ClusterInfo> {
        self.read().hard_clusters().to_vec()
    }

    pub fn transparency_stats(&self) -> TransparencyStats {
        self.read().transparency().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processor::EngineConfig;
    use crate::transport::SensorRegistry;
    use std::thread;

    #[test]
    fn test_concurrent_readers_see_committed_state() {
        let engine = SyncEngine::new(
            SensorRegistry::new(["Blue", "Green", "Red"]),
            EngineConfig::default(),
        );
        let shared = SharedEngine::new(engine);

        let writer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let hr = 60.0 + i as f64;
                    shared
                        .update(&SensorUpdate::new("Blue", hr, vec![60.0 / hr]))
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let distance = shared.distance_matrix();
                        assert_eq!(distance.size(), 3);
                        assert!(distance.is_symmetric());
                        let hr = shared.recent_hr(&SensorId::new("Blue"), 200).unwrap();
                        assert_eq!(hr.len(), 100);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(shared.transparency_stats().updates_processed, 50);
        let last = shared.recent_hr(&SensorId::new("Blue"), 1).unwrap();
        assert!((last[0] - 109.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_sensor_through_handle() {
        let shared = SharedEngine::new(SyncEngine::new(
            SensorRegistry::new(["Blue"]),
            EngineConfig::default(),
        ));
        let result = shared.update(&SensorUpdate::new("Purple", 70.0, vec![0.8]));
        assert!(matches!(result, Err(SyncError::UnknownSensor { .. })));
        assert_eq!(shared.transparency_stats().updates_rejected, 1);
    }
}
