//! Physiological feature extraction from IBI streams.
//!
//! Each accepted IBI yields an instantaneous heart rate and, once at least two
//! IBIs are retained, a fresh RMSSD value over the whole retained buffer.

use crate::core::error::SyncError;
use crate::core::timeseries::{TimeSeries, TimestampedSample};
use crate::transport::SensorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

/// Distribution statistics over a sensor's heart-rate series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrStatistics {
    pub min: f64,
    pub max: f64,
    /// Element at index `len / 2` of the ascending-sorted series
    pub median: f64,
    pub mean: f64,
}

/// Most recent scalar values for one sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LastValues {
    /// Heart rate as reported by the device (bpm)
    pub heart_rate: f64,
    /// Heart rate derived from the latest IBI (bpm)
    pub instantaneous_hr: f64,
}

/// Result of feeding one batch of IBIs through the extractor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IbiOutcome {
    /// Instantaneous HR of the last accepted IBI, if any was accepted
    pub instantaneous_hr: Option<f64>,
    /// Number of IBIs appended
    pub accepted: usize,
    /// Skipped values, one `InvalidSample` each
    pub rejected: Vec<SyncError>,
}

/// Heart rate implied by a single inter-beat interval.
///
/// Returns `None` for non-positive or non-finite intervals, and for intervals
/// so small the rate overflows.
pub fn instantaneous_hr(ibi_secs: f64) -> Option<f64> {
    if !(ibi_secs.is_finite() && ibi_secs > 0.0) {
        return None;
    }
    Some(60.0 / ibi_secs).filter(|hr| hr.is_finite())
}

/// RMSSD over the full sequence of IBIs.
///
/// Returns `None` when fewer than two values are available or the result
/// overflows.
pub fn compute_hrv(ibis: &[f64]) -> Option<f64> {
    if ibis.len() < 2 {
        return None;
    }

    let diffs: Vec<f64> = ibis.windows(2).map(|pair| pair[1] - pair[0]).collect();
    Some(diffs.iter().quadratic_mean()).filter(|rmssd| rmssd.is_finite())
}

/// Min, max, median and mean of a series; `None` when it is empty.
pub fn compute_statistics(values: &[f64]) -> Option<HrStatistics> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    Some(HrStatistics {
        min: Statistics::min(values.iter()),
        max: Statistics::max(values.iter()),
        median: sorted[sorted.len() / 2],
        mean: values.iter().mean(),
    })
}

/// Feed a batch of IBIs into a sensor's series, in arrival order.
///
/// Invalid values are skipped without aborting the batch.
pub fn extract_features(
    series: &mut TimeSeries,
    sensor_id: &SensorId,
    ibis: &[f64],
    now: DateTime<Utc>,
) -> IbiOutcome {
    let mut outcome = IbiOutcome::default();

    for &ibi in ibis {
        let Some(hr) = instantaneous_hr(ibi) else {
            debug!(sensor = %sensor_id, ibi, "Skipping invalid IBI");
            outcome.rejected.push(SyncError::InvalidSample {
                sensor_id: sensor_id.clone(),
                value: ibi,
            });
            continue;
        };

        series.push_ibis(&[ibi]);
        outcome.instantaneous_hr = Some(hr);
        outcome.accepted += 1;
        series.push_hr(TimestampedSample::new(now, hr));

        if let Some(hrv) = compute_hrv(&series.ibi_values()) {
            series.push_hrv(TimestampedSample::new(now, hrv));
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_instantaneous_hr() {
        assert!((instantaneous_hr(0.85).unwrap() - 70.588_235_294).abs() < 1e-6);
        assert_eq!(instantaneous_hr(1.0), Some(60.0));
        assert_eq!(instantaneous_hr(0.0), None);
        assert_eq!(instantaneous_hr(-0.5), None);
        assert_eq!(instantaneous_hr(f64::NAN), None);
        assert_eq!(instantaneous_hr(1e-310), None);
    }

    #[test]
    fn test_hrv_requires_two_samples() {
        assert_eq!(compute_hrv(&[]), None);
        assert_eq!(compute_hrv(&[0.9]), None);
    }

    #[test]
    fn test_hrv_overflow_is_not_emitted() {
        assert_eq!(compute_hrv(&[1.0, 1e200]), None);

        let mut series = TimeSeries::empty(100);
        let sensor = SensorId::new("Green");
        let outcome = extract_features(&mut series, &sensor, &[1.0, 1e200], Utc::now());
        assert_eq!(outcome.accepted, 2);
        assert!(series.hrv_samples.is_empty());
    }

    #[test]
    fn test_hrv_known_values() {
        assert!(compute_hrv(&[1.0, 1.0]).unwrap().abs() < EPS);
        assert!((compute_hrv(&[0.8, 1.0]).unwrap() - 0.2).abs() < EPS);
        // diffs 0.1, -0.2 -> sqrt((0.01 + 0.04) / 2)
        assert!((compute_hrv(&[0.8, 0.9, 0.7]).unwrap() - 0.025_f64.sqrt()).abs() < EPS);
    }

    #[test]
    fn test_statistics_lower_index_median() {
        let stats = compute_statistics(&[90.0, 60.0, 80.0, 70.0]).unwrap();
        assert_eq!(stats.min, 60.0);
        assert_eq!(stats.max, 90.0);
        assert_eq!(stats.median, 80.0);
        assert!((stats.mean - 75.0).abs() < EPS);

        let odd = compute_statistics(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(odd.median, 2.0);

        assert!(compute_statistics(&[]).is_none());
    }

    #[test]
    fn test_extract_features_skips_invalid() {
        let mut series = TimeSeries::empty(100);
        let sensor = SensorId::new("Blue");
        let outcome = extract_features(&mut series, &sensor, &[0.8, 0.0, 1.0], Utc::now());

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.instantaneous_hr, Some(60.0));
        assert_eq!(series.ibi_values(), vec![0.8, 1.0]);
        assert_eq!(series.hr_values(), vec![75.0, 60.0]);

        // HRV is only emitted once two IBIs are retained
        assert_eq!(series.hrv_samples.len(), 1);
        assert!((series.latest_hrv().unwrap() - 0.2).abs() < EPS);
    }

    #[test]
    fn test_extract_features_uses_whole_buffer() {
        let mut series = TimeSeries::empty(100);
        let sensor = SensorId::new("Red");
        extract_features(&mut series, &sensor, &[0.8, 0.9], Utc::now());
        extract_features(&mut series, &sensor, &[0.7], Utc::now());

        assert!((series.latest_hrv().unwrap() - 0.025_f64.sqrt()).abs() < EPS);
    }
}
