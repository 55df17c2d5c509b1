//! Fixed-capacity rolling buffers of per-sensor samples.
//!
//! Every buffer evicts its oldest item once full. Buffers can be pre-filled
//! with placeholder samples so downstream consumers never see an empty series.

use crate::core::error::SyncError;
use crate::transport::{SensorId, SensorRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default number of items retained per buffer.
pub const DEFAULT_CAPACITY: usize = 100;

/// Placeholder heart rate used when pre-filling (bpm).
pub const PLACEHOLDER_HR: f64 = 60.0;

/// Placeholder HRV used when pre-filling (seconds).
pub const PLACEHOLDER_HRV: f64 = 0.0;

/// Placeholder IBI used when pre-filling (seconds).
pub const PLACEHOLDER_IBI: f64 = 1.0;

/// A value with the instant it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSample<V> {
    pub timestamp: DateTime<Utc>,
    pub value: V,
}

impl<V> TimestampedSample<V> {
    pub fn new(timestamp: DateTime<Utc>, value: V) -> Self {
        Self { timestamp, value }
    }
}

/// A FIFO buffer that never grows past its capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Create a buffer filled to capacity with copies of `item`.
    pub fn filled(capacity: usize, item: T) -> Self {
        Self {
            capacity,
            items: std::iter::repeat(item).take(capacity).collect(),
        }
    }

    /// Append an item, dropping from the front when full.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// The last `n` items (or fewer) in arrival order.
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The three rolling series kept for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub hr_samples: RingBuffer<TimestampedSample<f64>>,
    pub hrv_samples: RingBuffer<TimestampedSample<f64>>,
    pub ibi_samples: RingBuffer<f64>,
}

impl TimeSeries {
    /// Empty series with the given capacity.
    pub fn empty(capacity: usize) -> Self {
        Self {
            hr_samples: RingBuffer::new(capacity),
            hrv_samples: RingBuffer::new(capacity),
            ibi_samples: RingBuffer::new(capacity),
        }
    }

    /// Series pre-filled with placeholder samples dated `now`.
    pub fn with_placeholders(capacity: usize, now: DateTime<Utc>) -> Self {
        Self {
            hr_samples: RingBuffer::filled(capacity, TimestampedSample::new(now, PLACEHOLDER_HR)),
            hrv_samples: RingBuffer::filled(
                capacity,
                TimestampedSample::new(now, PLACEHOLDER_HRV),
            ),
            ibi_samples: RingBuffer::filled(capacity, PLACEHOLDER_IBI),
        }
    }

    pub fn push_hr(&mut self, sample: TimestampedSample<f64>) {
        self.hr_samples.push(sample);
    }

    pub fn push_hrv(&mut self, sample: TimestampedSample<f64>) {
        self.hrv_samples.push(sample);
    }

    pub fn push_ibis(&mut self, values: &[f64]) {
        for &value in values {
            self.ibi_samples.push(value);
        }
    }

    pub fn hr_values(&self) -> Vec<f64> {
        self.hr_samples.iter().map(|s| s.value).collect()
    }

    pub fn ibi_values(&self) -> Vec<f64> {
        self.ibi_samples.iter().copied().collect()
    }

    /// Most recent HRV value, if any.
    pub fn latest_hrv(&self) -> Option<f64> {
        self.hrv_samples.last().map(|s| s.value)
    }
}

/// Per-sensor time series keyed by the fixed registry.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesStore {
    capacity: usize,
    series: BTreeMap<SensorId, TimeSeries>,
}

impl TimeSeriesStore {
    /// Create a store with one series per registered sensor.
    pub fn new(
        registry: &SensorRegistry,
        capacity: usize,
        prefill: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let series = registry
            .ids()
            .iter()
            .map(|id| {
                let series = if prefill {
                    TimeSeries::with_placeholders(capacity, now)
                } else {
                    TimeSeries::empty(capacity)
                };
                (id.clone(), series)
            })
            .collect();

        Self { capacity, series }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, sensor_id: &SensorId) -> Result<&TimeSeries, SyncError> {
        self.series
            .get(sensor_id)
            .ok_or_else(|| SyncError::UnknownSensor {
                sensor_id: sensor_id.clone(),
            })
    }

    pub fn get_mut(&mut self, sensor_id: &SensorId) -> Result<&mut TimeSeries, SyncError> {
        self.series
            .get_mut(sensor_id)
            .ok_or_else(|| SyncError::UnknownSensor {
                sensor_id: sensor_id.clone(),
            })
    }

    /// Replace a sensor's series wholesale (used to commit a staged update).
    pub fn replace(&mut self, sensor_id: &SensorId, series: TimeSeries) -> Result<(), SyncError> {
        *self.get_mut(sensor_id)? = series;
        Ok(())
    }

    pub fn append_hr(
        &mut self,
        sensor_id: &SensorId,
        sample: TimestampedSample<f64>,
    ) -> Result<(), SyncError> {
        self.get_mut(sensor_id)?.push_hr(sample);
        Ok(())
    }

    pub fn append_hrv(
        &mut self,
        sensor_id: &SensorId,
        sample: TimestampedSample<f64>,
    ) -> Result<(), SyncError> {
        self.get_mut(sensor_id)?.push_hrv(sample);
        Ok(())
    }

    pub fn append_ibis(&mut self, sensor_id: &SensorId, values: &[f64]) -> Result<(), SyncError> {
        self.get_mut(sensor_id)?.push_ibis(values);
        Ok(())
    }

    pub fn recent_hr(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        Ok(self
            .get(sensor_id)?
            .hr_samples
            .recent(n)
            .into_iter()
            .map(|s| s.value)
            .collect())
    }

    pub fn recent_hr_samples(
        &self,
        sensor_id: &SensorId,
        n: usize,
    ) -> Result<Vec<TimestampedSample<f64>>, SyncError> {
        Ok(self.get(sensor_id)?.hr_samples.recent(n))
    }

    pub fn recent_hrv(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        Ok(self
            .get(sensor_id)?
            .hrv_samples
            .recent(n)
            .into_iter()
            .map(|s| s.value)
            .collect())
    }

    pub fn recent_ibi(&self, sensor_id: &SensorId, n: usize) -> Result<Vec<f64>, SyncError> {
        Ok(self.get(sensor_id)?.ibi_samples.recent(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SensorRegistry {
        SensorRegistry::new(["Blue", "Green", "Red"])
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut buffer = RingBuffer::new(3);
        for i in 0..5 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.recent(10), vec![2, 3, 4]);
        assert_eq!(buffer.recent(2), vec![3, 4]);
        assert_eq!(buffer.last(), Some(&4));
    }

    #[test]
    fn test_ring_buffer_never_exceeds_capacity() {
        let mut buffer = RingBuffer::new(DEFAULT_CAPACITY);
        for i in 0..250 {
            buffer.push(i);
            assert!(buffer.len() <= DEFAULT_CAPACITY);
        }
        let expected: Vec<i32> = (150..250).collect();
        assert_eq!(buffer.recent(DEFAULT_CAPACITY), expected);
    }

    #[test]
    fn test_placeholder_prefill() {
        let now = Utc::now();
        let store = TimeSeriesStore::new(&registry(), DEFAULT_CAPACITY, true, now);
        let series = store.get(&"Blue".into()).unwrap();

        assert_eq!(series.hr_samples.len(), DEFAULT_CAPACITY);
        assert_eq!(series.hrv_samples.len(), DEFAULT_CAPACITY);
        assert_eq!(series.ibi_samples.len(), DEFAULT_CAPACITY);
        assert!(series.hr_samples.iter().all(|s| s.value == 60.0 && s.timestamp == now));
        assert!(series.ibi_samples.iter().all(|&v| v == 1.0));
        assert_eq!(series.latest_hrv(), Some(0.0));
    }

    #[test]
    fn test_unknown_sensor_rejected() {
        let mut store = TimeSeriesStore::new(&registry(), 10, false, Utc::now());
        let unknown = SensorId::new("Purple");

        assert!(matches!(
            store.append_ibis(&unknown, &[0.8]),
            Err(SyncError::UnknownSensor { .. })
        ));
        assert!(store.recent_hr(&unknown, 5).is_err());
    }

    #[test]
    fn test_recent_returns_fewer_when_short() {
        let mut store = TimeSeriesStore::new(&registry(), 10, false, Utc::now());
        let blue = SensorId::new("Blue");
        store.append_ibis(&blue, &[0.8, 0.9]).unwrap();

        assert_eq!(store.recent_ibi(&blue, 5).unwrap(), vec![0.8, 0.9]);
        assert!(store.recent_hrv(&blue, 5).unwrap().is_empty());
    }
}
