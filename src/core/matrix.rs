//! Pairwise distance and proximity between sensors.
//!
//! Both matrices are recomputed from scratch on every update. Sensor counts
//! are tiny, so the O(N²) pass is cheaper than tracking staleness.

use crate::core::error::SyncError;
use serde::{Deserialize, Serialize};

/// Heart rate that maps to the top of the normalized range (bpm).
pub const HR_NORMALIZATION_CEILING: f64 = 200.0;

/// Square matrix indexed by the fixed sensor ordering.
///
/// Serializes as a plain array of rows. Deserialization rejects ragged rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct PairwiseMatrix {
    rows: Vec<Vec<f64>>,
}

impl TryFrom<Vec<Vec<f64>>> for PairwiseMatrix {
    type Error = SyncError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<PairwiseMatrix> for Vec<Vec<f64>> {
    fn from(matrix: PairwiseMatrix) -> Self {
        matrix.rows
    }
}

impl PairwiseMatrix {
    /// An `n`×`n` matrix filled with `value`.
    pub fn filled(n: usize, value: f64) -> Self {
        Self {
            rows: vec![vec![value; n]; n],
        }
    }

    /// Build from explicit rows, rejecting ragged input.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, SyncError> {
        let n = rows.len();
        if let Some(bad) = rows.iter().find(|row| row.len() != n) {
            return Err(SyncError::DimensionMismatch {
                expected: n,
                actual: bad.len(),
            });
        }
        Ok(Self { rows })
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Whether every row has `size()` columns.
    pub fn is_square(&self) -> bool {
        let n = self.rows.len();
        self.rows.iter().all(|row| row.len() == n)
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.size();
        (0..n).all(|i| (0..n).all(|j| self.rows[i][j] == self.rows[j][i]))
    }

    /// Values strictly above the diagonal, row by row.
    pub fn upper_triangle(&self) -> Vec<f64> {
        let n = self.size();
        (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| self.rows[i][j])
            .collect()
    }

    fn set_pair(&mut self, i: usize, j: usize, value: f64) {
        self.rows[i][j] = value;
        self.rows[j][i] = value;
    }
}

/// Map a heart rate onto `[0, 1]`.
pub fn normalize_hr(hr: f64) -> f64 {
    (hr / HR_NORMALIZATION_CEILING).clamp(0.0, 1.0)
}

/// Distance and proximity matrices for one set of heart rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairwiseMatrices {
    pub distance: PairwiseMatrix,
    pub proximity: PairwiseMatrix,
}

impl PairwiseMatrices {
    /// Compute both matrices from heart rates in sensor order.
    pub fn compute(heart_rates: &[f64]) -> Self {
        let n = heart_rates.len();
        let normalized: Vec<f64> = heart_rates.iter().map(|&hr| normalize_hr(hr)).collect();

        let mut distance = PairwiseMatrix::filled(n, 0.0);
        let mut proximity = PairwiseMatrix::filled(n, 1.0);

        for i in 0..n {
            for j in (i + 1)..n {
                let d = (normalized[i] - normalized[j]).abs();
                distance.set_pair(i, j, d);
                proximity.set_pair(i, j, 1.0 - d);
            }
        }

        Self {
            distance,
            proximity,
        }
    }

    /// Mean of the strict upper triangle of the proximity matrix.
    pub fn proximity_score(&self) -> f64 {
        proximity_score(&self.proximity)
    }
}

/// Mean pairwise proximity, excluding the diagonal. Zero for fewer than two sensors.
pub fn proximity_score(proximity: &PairwiseMatrix) -> f64 {
    let upper = proximity.upper_triangle();
    if upper.is_empty() {
        return 0.0;
    }
    upper.iter().sum::<f64>() / upper.len() as f64
}
