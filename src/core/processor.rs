//! The update pipeline.
//!
//! `SyncEngine` owns every piece of per-session state. One call to
//! [`SyncEngine::process_update`] runs the whole chain:
//!
//! 1. Append IBIs, instantaneous HR and RMSSD to the sensor's series
//! 2. Recompute the distance and proximity matrices
//! 3. Run one cluster detection tick
//! 4. Assemble an aggregate record and hand it to the sink
//!
//! Steps 1-3 run against staged copies and are committed together, so a
//! rejected update leaves the engine exactly as it was.

use crate::core::clusters::{ClusterDetector, ClusterInfo, ClusterTransition, DEFAULT_THRESHOLD};
use crate::core::error::SyncError;
use crate::core::features::{compute_statistics, extract_features, HrStatistics, LastValues};
use crate::core::matrix::{PairwiseMatrices, PairwiseMatrix};
use crate::core::record::{AggregateRecord, RecordBuilder, RecordContents, SensorSnapshot};
use crate::core::timeseries::{TimeSeriesStore, TimestampedSample, DEFAULT_CAPACITY};
use crate::sink::RecordSink;
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use crate::transport::{SensorId, SensorRegistry, SensorUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Tunables for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cluster threshold on normalized distance
    pub threshold: f64,
    /// Items retained per time-series buffer
    pub buffer_capacity: usize,
    /// Start buffers with placeholder samples
    pub prefill: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            buffer_capacity: DEFAULT_CAPACITY,
            prefill: true,
        }
    }
}

/// Outcome of one successfully processed update.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    /// The record emitted for this update
    pub record: AggregateRecord,
    /// Clusters that switched state on this tick
    pub transitions: Vec<ClusterTransition>,
    /// Non-fatal problems: skipped samples and failed record handoff
    pub warnings: Vec<SyncError>,
    /// Number of IBIs appended
    pub accepted_ibis: usize,
}

impl UpdateReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether the record reached the sink (always true without a sink).
    pub fn handed_off(&self) -> bool {
        !self
            .warnings
            .iter()
            .any(|w| matches!(w, SyncError::PersistenceHandoffFailed { .. }))
    }
}

/// Owner of all time series, matrices and cluster state for one session.
pub struct SyncEngine {
    config: EngineConfig,
    registry: SensorRegistry,
    store: TimeSeriesStore,
    last_values: BTreeMap<SensorId, LastValues>,
    matrices: PairwiseMatrices,
    detector: ClusterDetector,
    records: RecordBuilder,
    sink: Option<Box<dyn RecordSink>>,
    transparency: SharedTransparencyLog,
}

impl SyncEngine {
    /// Create an engine for the given sensors.
    pub fn new(registry: SensorRegistry, config: EngineConfig) -> Self {
        Self::new_at(registry, config, Utc::now())
    }

    /// Create an engine whose placeholder samples are dated `now`.
    pub fn new_at(registry: SensorRegistry, config: EngineConfig, now: DateTime<Utc>) -> Self {
        let store = TimeSeriesStore::new(&registry, config.buffer_capacity, config.prefill, now);
        let last_values = registry
            .ids()
            .iter()
            .map(|id| (id.clone(), LastValues::default()))
            .collect();
        let matrices = PairwiseMatrices::compute(&vec![0.0; registry.len()]);
        let detector = ClusterDetector::new(config.threshold);

        Self {
            config,
            registry,
            store,
            last_values,
            matrices,
            detector,
            records: RecordBuilder::new(),
            sink: None,
            transparency: create_shared_log(),
        }
    }

    /// Attach the sink that receives every aggregate record.
    pub fn with_sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share an existing transparency log instead of a private one.
    pub fn with_transparency_log(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = log;
        self
    }

    /// Use a caller-chosen session id for records.
    pub fn with_session_id(mut self, session_id: String) -> Self {
        self.records = self.records.with_session_id(session_id);
        self
    }

    pub fn set_sink(&mut self, sink: Box<dyn RecordSink>) {
        self.sink = Some(sink);
    }

    /// Detach and return the current sink.
    pub fn take_sink(&mut self) -> Option<Box<dyn RecordSink>> {
        self.sink.take()
    }

    /// Process one transport packet, timestamping samples with the current time.
    pub fn process_update(&mut self, update: &SensorUpdate) -> Result<UpdateReport, SyncError> {
        self.process_update_at(update, Utc::now())
    }

    /// Process one transport packet, timestamping samples with `now`.
    pub fn process_update_at(
        &mut self,
        update: &SensorUpdate,
        now: DateTime<Utc>,
    ) -> Result<UpdateReport, SyncError> {
        let sensor_id = &update.sensor_id;
        if !self.registry.contains(sensor_id) {
            warn!(sensor = %sensor_id, "Rejecting update from unknown sensor");
            self.transparency.record_update_rejected();
            return Err(SyncError::UnknownSensor {
                sensor_id: sensor_id.clone(),
            });
        }

        // Stage the sensor's series and values
        let mut series = self.store.get(sensor_id)?.clone();
        let outcome = extract_features(&mut series, sensor_id, &update.ibis, now);

        let mut last = self.last_values.get(sensor_id).copied().unwrap_or_default();
        let mut invalid_hr = None;
        if update.heart_rate.is_finite() {
            last.heart_rate = update.heart_rate;
        } else {
            invalid_hr = Some(SyncError::InvalidSample {
                sensor_id: sensor_id.clone(),
                value: update.heart_rate,
            });
        }
        if let Some(hr) = outcome.instantaneous_hr {
            last.instantaneous_hr = hr;
        }

        let heart_rates: Vec<f64> = self
            .registry
            .ids()
            .iter()
            .map(|id| {
                if id == sensor_id {
                    last.instantaneous_hr
                } else {
                    self.last_values
                        .get(id)
                        .map(|v| v.instantaneous_hr)
                        .unwrap_or_default()
                }
            })
            .collect();
        let matrices = PairwiseMatrices::compute(&heart_rates);

        let mut detector = self.detector.clone();
        let transitions = match detector.update(self.registry.ids(), &matrices.proximity) {
            Ok(transitions) => transitions,
            Err(e) => {
                warn!(sensor = %sensor_id, "Aborting update: {e}");
                self.transparency.record_update_rejected();
                return Err(e);
            }
        };

        // Commit
        self.store.replace(sensor_id, series)?;
        self.last_values.insert(sensor_id.clone(), last);
        self.matrices = matrices;
        self.detector = detector;

        let rejected = outcome.rejected.len() as u64;
        self.transparency
            .record_ibis(outcome.accepted as u64, rejected);
        self.transparency.record_update_processed();

        debug!(
            sensor = %sensor_id,
            heart_rate = update.heart_rate,
            accepted = outcome.accepted,
            rejected,
            score = self.proximity_score(),
            "Processed update"
        );

        let mut warnings = outcome.rejected;
        warnings.extend(invalid_hr);
        for warning in &warnings {
            warn!("{warning}");
        }

        let record = self.build_record(sensor_id, now);
        if let Some(failure) = self.hand_off(&record) {
            warnings.push(failure);
        }

        Ok(UpdateReport {
            record,
            transitions,
            warnings,
            accepted_ibis: outcome.accepted,
        })
    }

    /// Start a fresh recording session.
    ///
    /// Series are rebuilt (placeholders dated `now`), last values, matrices and
    /// cluster history are cleared, and records get a new session id.
    pub fn reset_session_at(&mut self, now: DateTime<Utc>) {
        self.store = TimeSeriesStore::new(
            &self.registry,
            self.config.buffer_capacity,
            self.config.prefill,
            now,
        );
        for values in self.last_values.values_mut() {
            *values = LastValues::default();
        }
        self.matrices = PairwiseMatrices::compute(&vec![0.0; self.registry.len()]);
        self.detector.clear();
        let session_id = self.records.start_session().to_string();
        debug!(session_id, "Started new session");
    }

    pub fn reset_session(&mut self) {
        self.reset_session_at(Utc::now());
    }

    fn build_record(&mut self, trigger: &SensorId, now: DateTime<Utc>) -> AggregateRecord {
        let sensors = self
            .registry
            .ids()
            .iter()
            .filter_map(|id| {
                let series = self.store.get(id).ok()?;
                let last = self.last_values.get(id).copied().unwrap_or_default();
                Some(SensorSnapshot {
                    sensor_id: id.clone(),
                    last_hr: last.heart_rate,
                    instantaneous_hr: last.instantaneous_hr,
                    hrv: series.latest_hrv(),
                    ibi: series.ibi_values(),
                })
            })
            .collect();

        self.records.build(RecordContents {
            timestamp: now,
            trigger_sensor: trigger,
            sensors,
            distance_matrix: &self.matrices.distance,
            proximity_matrix: &self.matrices.proximity,
            proximity_score: self.matrices.proximity_score(),
            soft_clusters: self.detector.soft_clusters(),
            hard_clusters: self.detector.hard_clusters(),
        })
    }

    fn hand_off(&mut self, record: &AggregateRecord) -> Option<SyncError> {
        let sink = self.sink.as_mut()?;
        match sink.accept(record) {
            Ok(()) => {
                self.transparency.record_record_emitted();
                None
            }
            Err(e) => {
                warn!(sequence = record.sequence, "Record handoff failed: {e}");
                self.transparency.record_handoff_failure();
                Some(SyncError::PersistenceHandoffFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    pub fn sensor_ids(&self) -> &[SensorId] {
        self.registry.ids()
    }

    pub fn session_id(&self) -> &str {
        self.records.session_id()
    }

    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.transparency
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn recent_hr(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        self.store.recent_hr(sensor_id, n)
    }

    pub fn recent_hr_samples(
        &self,
        sensor_id: &SensorId,
        n: usize,
    ) -> Result<Vec<TimestampedSample<f64>>, SyncError> {
        self.store.recent_hr_samples(sensor_id, n)
    }

    pub fn recent_hrv(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        self.store.recent_hrv(sensor_id, n)
    }

    pub fn recent_ibi(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        self.store.recent_ibi(sensor_id, n)
    }

    /// Statistics over the sensor's HR series; `None` if it is empty.
    pub fn statistics(&self, sensor_id: &SensorId) -> Result<Option<HrStatistics>, SyncError> {
        Ok(compute_statistics(&self.store.get(sensor_id)?.hr_values()))
    }

    pub fn last_heart_rate(&self, sensor_id: &SensorId) -> Result<f64, SyncError> {
        self.last_values(sensor_id).map(|v| v.heart_rate)
    }

    pub fn last_instantaneous_hr(&self, sensor_id: &SensorId) -> Result<f64, SyncError> {
        self.last_values(sensor_id).map(|v| v.instantaneous_hr)
    }

    fn last_values(&self, sensor_id: &SensorId) -> Result<LastValues, SyncError> {
        self.last_values
            .get(sensor_id)
            .copied()
            .ok_or_else(|| SyncError::UnknownSensor {
                sensor_id: sensor_id.clone(),
            })
    }

    pub fn distance_matrix(&self) -> &PairwiseMatrix {
        &self.matrices.distance
    }

    pub fn proximity_matrix(&self) -> &PairwiseMatrix {
        &self.matrices.proximity
    }

    pub fn proximity_score(&self) -> f64 {
        self.matrices.proximity_score()
    }

    pub fn soft_clusters(&self) -> &[ClusterInfo] {
        self.detector.soft_clusters()
    }

    pub fn hard_clusters(&self) -> &[ClusterInfo] {
        self.detector.hard_clusters()
    }

    pub fn active_soft_clusters(&self) -> Vec<ClusterInfo> {
        self.detector.active_soft_clusters()
    }

    pub fn active_hard_clusters(&self) -> Vec<ClusterInfo> {
        self.detector.active_hard_clusters()
    }
}
