//! Aggregate records handed to the persistence collaborator.
//!
//! One record is emitted per processed update. It carries everything a
//! session review needs to redraw that tick: per-sensor values, both pairwise
//! matrices and the full cluster histories.

use crate::core::clusters::ClusterInfo;
use crate::core::matrix::PairwiseMatrix;
use crate::transport::SensorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record schema version.
pub const RECORD_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "synheart-group-sync";

/// Producer metadata stamped on every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordProducer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
    /// Host-derived device identifier
    pub device_id: String,
    /// Unique instance identifier
    pub instance_id: Uuid,
}

/// Per-sensor values at the time of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub sensor_id: SensorId,
    /// Last device-reported heart rate (bpm)
    pub last_hr: f64,
    /// Last IBI-derived heart rate (bpm)
    pub instantaneous_hr: f64,
    /// Latest RMSSD value (seconds), if one has been computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hrv: Option<f64>,
    /// Retained IBI buffer (seconds), oldest first
    pub ibi: Vec<f64>,
}

/// Everything produced by one processed update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// Record schema version
    pub record_version: String,
    pub record_id: Uuid,
    pub session_id: String,
    /// Position of this record within the session, starting at 1
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub producer: RecordProducer,
    /// Sensor whose update produced this record
    pub trigger_sensor: SensorId,
    /// Snapshots in the fixed sensor ordering
    pub sensors: Vec<SensorSnapshot>,
    pub distance_matrix: PairwiseMatrix,
    pub proximity_matrix: PairwiseMatrix,
    pub proximity_score: f64,
    pub soft_clusters: Vec<ClusterInfo>,
    pub hard_clusters: Vec<ClusterInfo>,
}

impl AggregateRecord {
    pub fn active_soft_count(&self) -> usize {
        self.soft_clusters.iter().filter(|c| c.is_active).count()
    }

    pub fn active_hard_count(&self) -> usize {
        self.hard_clusters.iter().filter(|c| c.is_active).count()
    }

    pub fn sensor(&self, sensor_id: &SensorId) -> Option<&SensorSnapshot> {
        self.sensors.iter().find(|s| &s.sensor_id == sensor_id)
    }
}

/// The tick contents a record is assembled from.
#[derive(Debug, Clone)]
pub struct RecordContents<'a> {
    pub timestamp: DateTime<Utc>,
    pub trigger_sensor: &'a SensorId,
    pub sensors: Vec<SensorSnapshot>,
    pub distance_matrix: &'a PairwiseMatrix,
    pub proximity_matrix: &'a PairwiseMatrix,
    pub proximity_score: f64,
    pub soft_clusters: &'a [ClusterInfo],
    pub hard_clusters: &'a [ClusterInfo],
}

/// Builder for aggregate records within one recording session.
pub struct RecordBuilder {
    instance_id: Uuid,
    device_id: String,
    session_id: String,
    sequence: u64,
}

impl RecordBuilder {
    /// Create a new builder with a unique instance ID and a fresh session.
    pub fn new() -> Self {
        let instance_id = Uuid::new_v4();
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let device_id = format!("{}-{}", hostname, &instance_id.to_string()[..8]);

        Self {
            instance_id,
            device_id,
            session_id: new_session_id(),
            sequence: 0,
        }
    }

    /// Set the session ID for generated records.
    pub fn with_session_id(mut self, session_id: String) -> Self {
        self.session_id = session_id;
        self
    }

    /// Start a new session: fresh id, sequence restarts.
    pub fn start_session(&mut self) -> &str {
        self.session_id = new_session_id();
        self.sequence = 0;
        &self.session_id
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Number of records built in the current session.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Assemble the next record in the session.
    pub fn build(&mut self, contents: RecordContents<'_>) -> AggregateRecord {
        self.sequence += 1;

        AggregateRecord {
            record_version: RECORD_VERSION.to_string(),
            record_id: Uuid::new_v4(),
            session_id: self.session_id.clone(),
            sequence: self.sequence,
            timestamp: contents.timestamp,
            producer: RecordProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                device_id: self.device_id.clone(),
                instance_id: self.instance_id,
            },
            trigger_sensor: contents.trigger_sensor.clone(),
            sensors: contents.sensors,
            distance_matrix: contents.distance_matrix.clone(),
            proximity_matrix: contents.proximity_matrix.clone(),
            proximity_score: contents.proximity_score,
            soft_clusters: contents.soft_clusters.to_vec(),
            hard_clusters: contents.hard_clusters.to_vec(),
        }
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn new_session_id() -> String {
    format!("SESS-{}", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matrix::PairwiseMatrices;
    use std::collections::BTreeSet;

    fn contents<'a>(
        trigger: &'a SensorId,
        matrices: &'a PairwiseMatrices,
        soft: &'a [ClusterInfo],
    ) -> RecordContents<'a> {
        RecordContents {
            timestamp: Utc::now(),
            trigger_sensor: trigger,
            sensors: vec![SensorSnapshot {
                sensor_id: trigger.clone(),
                last_hr: 72.0,
                instantaneous_hr: 70.0,
                hrv: None,
                ibi: vec![0.85],
            }],
            distance_matrix: &matrices.distance,
            proximity_matrix: &matrices.proximity,
            proximity_score: matrices.proximity_score(),
            soft_clusters: soft,
            hard_clusters: &[],
        }
    }

    #[test]
    fn test_sequence_increments_and_resets() {
        let mut builder = RecordBuilder::new().with_session_id("SESS-test".to_string());
        let trigger = SensorId::new("Blue");
        let matrices = PairwiseMatrices::compute(&[70.0, 80.0]);

        let first = builder.build(contents(&trigger, &matrices, &[]));
        let second = builder.build(contents(&trigger, &matrices, &[]));
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(first.session_id, "SESS-test");
        assert_ne!(first.record_id, second.record_id);

        builder.start_session();
        assert_eq!(builder.sequence(), 0);
        assert_ne!(builder.session_id(), "SESS-test");
    }

    #[test]
    fn test_record_json_shape() {
        let mut builder = RecordBuilder::new();
        let trigger = SensorId::new("Blue");
        let matrices = PairwiseMatrices::compute(&[70.0, 80.0]);
        let soft = vec![ClusterInfo {
            members: ["Blue", "Green"].iter().map(|&s| SensorId::new(s)).collect::<BTreeSet<_>>(),
            is_active: true,
            activation_count: 3,
        }];

        let record = builder.build(contents(&trigger, &matrices, &soft));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["record_version"], RECORD_VERSION);
        assert_eq!(json["producer"]["name"], PRODUCER_NAME);
        assert_eq!(json["trigger_sensor"], "Blue");
        assert_eq!(json["distance_matrix"].as_array().unwrap().len(), 2);
        assert_eq!(json["soft_clusters"][0]["members"][1], "Green");
        assert_eq!(json["soft_clusters"][0]["activation_count"], 3);
        assert!(json["sensors"][0].get("hrv").is_none());

        let parsed: AggregateRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.record_id, record.record_id);
        assert_eq!(parsed.soft_clusters, record.soft_clusters);
        assert_eq!(parsed.active_soft_count(), 1);
    }
}
