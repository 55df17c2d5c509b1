//! Sensor identity and update types delivered by the wireless transport.
//!
//! The transport itself (discovery, pairing, packet decoding) lives outside this
//! crate. These types are the boundary: one `SensorUpdate` per received packet.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tracked wearable sensor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SensorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The fixed set of known sensors.
///
/// Ids are sorted lexicographically and de-duplicated at construction. Every
/// matrix produced by the engine is indexed by this ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRegistry {
    ids: Vec<SensorId>,
}

impl SensorRegistry {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SensorId>,
    {
        let mut ids: Vec<SensorId> = ids.into_iter().map(Into::into).collect();
        ids.sort();
        ids.dedup();
        Self { ids }
    }

    /// Position of a sensor in the fixed ordering.
    pub fn index_of(&self, id: &SensorId) -> Option<usize> {
        self.ids.binary_search(id).ok()
    }

    pub fn contains(&self, id: &SensorId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn ids(&self) -> &[SensorId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One transport packet: device-reported heart rate plus zero or more IBIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorUpdate {
    /// Sensor that produced the packet
    pub sensor_id: SensorId,
    /// Heart rate reported by the device (bpm)
    pub heart_rate: f64,
    /// Inter-beat intervals carried by the packet (seconds)
    #[serde(default)]
    pub ibis: Vec<f64>,
}

impl SensorUpdate {
    pub fn new(sensor_id: impl Into<SensorId>, heart_rate: f64, ibis: Vec<f64>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            heart_rate,
            ibis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_orders_and_dedups() {
        let registry = SensorRegistry::new(["Red", "Blue", "Green", "Blue"]);
        let names: Vec<&str> = registry.ids().iter().map(SensorId::as_str).collect();
        assert_eq!(names, vec!["Blue", "Green", "Red"]);
        assert_eq!(registry.index_of(&"Green".into()), Some(1));
        assert!(!registry.contains(&"Purple".into()));
    }

    #[test]
    fn test_update_parses_without_ibis() {
        let update: SensorUpdate =
            serde_json::from_str(r#"{"sensor_id":"Blue","heart_rate":72.0}"#).unwrap();
        assert_eq!(update.sensor_id, SensorId::new("Blue"));
        assert!(update.ibis.is_empty());
    }
}
