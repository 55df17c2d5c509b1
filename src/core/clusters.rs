//! Soft and hard synchrony cluster detection with persistent identity.
//!
//! A cluster is identified by its member set. Entries are created the first
//! time a set qualifies and are never removed; each tick they are marked
//! inactive and re-activated if they qualify again, accumulating an
//! activation count.
//!
//! Triples are evaluated before pairs:
//! - a triple whose three pairs all meet the threshold is a hard cluster
//! - a triple with at least one qualifying pair is a soft cluster
//! - a qualifying pair becomes a soft cluster only if no triple evaluated in
//!   the same tick already covers it
//!
//! Pairs are never hard.

use crate::core::error::SyncError;
use crate::core::matrix::PairwiseMatrix;
use crate::transport::SensorId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Default cluster threshold on normalized distance.
pub const DEFAULT_THRESHOLD: f64 = 0.025;

/// A group of sensors tracked across ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// Member set (identity of the cluster)
    pub members: BTreeSet<SensorId>,
    /// Whether the cluster qualified on the latest tick
    pub is_active: bool,
    /// Number of ticks on which the cluster qualified
    pub activation_count: u64,
}

impl ClusterInfo {
    fn activated(members: BTreeSet<SensorId>) -> Self {
        Self {
            members,
            is_active: true,
            activation_count: 1,
        }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Which collection a cluster belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    Soft,
    Hard,
}

impl std::fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterKind::Soft => write!(f, "soft"),
            ClusterKind::Hard => write!(f, "hard"),
        }
    }
}

/// A cluster that switched state between two consecutive ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTransition {
    pub kind: ClusterKind,
    pub members: BTreeSet<SensorId>,
    /// `true` if the cluster became active, `false` if it went inactive
    pub activated: bool,
}

/// Stateful detector holding the soft and hard cluster histories.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterDetector {
    threshold: f64,
    soft_clusters: Vec<ClusterInfo>,
    hard_clusters: Vec<ClusterInfo>,
}

impl Default for ClusterDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl ClusterDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            soft_clusters: Vec::new(),
            hard_clusters: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Minimum proximity for a pair to count as synchronized.
    pub fn proximity_threshold(&self) -> f64 {
        1.0 - self.threshold
    }

    /// All soft clusters ever observed, active or not.
    pub fn soft_clusters(&self) -> &[ClusterInfo] {
        &self.soft_clusters
    }

    /// All hard clusters ever observed, active or not.
    pub fn hard_clusters(&self) -> &[ClusterInfo] {
        &self.hard_clusters
    }

    pub fn active_soft_clusters(&self) -> Vec<ClusterInfo> {
        self.soft_clusters.iter().filter(|c| c.is_active).cloned().collect()
    }

    pub fn active_hard_clusters(&self) -> Vec<ClusterInfo> {
        self.hard_clusters.iter().filter(|c| c.is_active).cloned().collect()
    }

    /// Forget every tracked cluster.
    pub fn clear(&mut self) {
        self.soft_clusters.clear();
        self.hard_clusters.clear();
    }

    /// Run one detection tick.
    ///
    /// `sensor_ids` must be in the same order as the matrix rows. On a size
    /// mismatch nothing is modified.
    pub fn update(
        &mut self,
        sensor_ids: &[SensorId],
        proximity: &PairwiseMatrix,
    ) -> Result<Vec<ClusterTransition>, SyncError> {
        let n = sensor_ids.len();
        if proximity.size() != n {
            return Err(SyncError::DimensionMismatch {
                expected: n,
                actual: proximity.size(),
            });
        }
        if !proximity.is_square() {
            return Err(SyncError::DimensionMismatch {
                expected: n,
                actual: proximity
                    .rows()
                    .iter()
                    .map(Vec::len)
                    .find(|&len| len != n)
                    .unwrap_or(n),
            });
        }

        let previously_active = self.active_sets();

        for cluster in self
            .soft_clusters
            .iter_mut()
            .chain(self.hard_clusters.iter_mut())
        {
            cluster.is_active = false;
        }

        let limit = self.proximity_threshold();
        let close = |i: usize, j: usize| proximity.get(i, j) >= limit;
        let members_of = |indices: &[usize]| -> BTreeSet<SensorId> {
            indices.iter().map(|&i| sensor_ids[i].clone()).collect()
        };

        let mut covered: Vec<BTreeSet<SensorId>> = Vec::new();

        for i in 0..n {
            for j in (i + 1)..n {
                for k in (j + 1)..n {
                    let pairs = [close(i, j), close(i, k), close(j, k)];
                    let members = members_of(&[i, j, k]);

                    if pairs.iter().all(|&c| c) {
                        upsert(&mut self.hard_clusters, &members);
                        covered.push(members);
                    } else if pairs.iter().any(|&c| c) {
                        upsert(&mut self.soft_clusters, &members);
                        covered.push(members);
                    }
                }
            }
        }

        for i in 0..n {
            for j in (i + 1)..n {
                if !close(i, j) {
                    continue;
                }
                let members = members_of(&[i, j]);
                if covered.iter().any(|triple| members.is_subset(triple)) {
                    continue;
                }
                upsert(&mut self.soft_clusters, &members);
            }
        }

        let transitions = self.transitions_since(&previously_active);
        for transition in &transitions {
            let names: Vec<&str> = transition.members.iter().map(SensorId::as_str).collect();
            if transition.activated {
                info!(kind = %transition.kind, members = ?names, "Cluster activated");
            } else {
                info!(kind = %transition.kind, members = ?names, "Cluster deactivated");
            }
        }

        Ok(transitions)
    }

    fn active_sets(&self) -> Vec<(ClusterKind, BTreeSet<SensorId>)> {
        let soft = self
            .soft_clusters
            .iter()
            .filter(|c| c.is_active)
            .map(|c| (ClusterKind::Soft, c.members.clone()));
        let hard = self
            .hard_clusters
            .iter()
            .filter(|c| c.is_active)
            .map(|c| (ClusterKind::Hard, c.members.clone()));
        soft.chain(hard).collect()
    }

    fn transitions_since(
        &self,
        previously_active: &[(ClusterKind, BTreeSet<SensorId>)],
    ) -> Vec<ClusterTransition> {
        let now_active = self.active_sets();

        let activated = now_active
            .iter()
            .filter(|entry| !previously_active.contains(entry))
            .map(|(kind, members)| ClusterTransition {
                kind: *kind,
                members: members.clone(),
                activated: true,
            });
        let deactivated = previously_active
            .iter()
            .filter(|entry| !now_active.contains(entry))
            .map(|(kind, members)| ClusterTransition {
                kind: *kind,
                members: members.clone(),
                activated: false,
            });

        activated.chain(deactivated).collect()
    }
}

/// Activate the cluster with this member set, creating it if unseen.
fn upsert(clusters: &mut Vec<ClusterInfo>, members: &BTreeSet<SensorId>) {
    match clusters.iter_mut().find(|c| &c.members == members) {
        Some(cluster) => {
            cluster.is_active = true;
            cluster.activation_count += 1;
        }
        None => clusters.push(ClusterInfo::activated(members.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matrix::PairwiseMatrices;

    fn ids(names: &[&str]) -> Vec<SensorId> {
        names.iter().map(|&n| SensorId::new(n)).collect()
    }

    fn set(names: &[&str]) -> BTreeSet<SensorId> {
        names.iter().map(|&n| SensorId::new(n)).collect()
    }

    fn tick(detector: &mut ClusterDetector, sensors: &[SensorId], hrs: &[f64]) {
        let matrices = PairwiseMatrices::compute(hrs);
        detector.update(sensors, &matrices.proximity).unwrap();
    }

    #[test]
    fn test_mutual_triple_is_hard_without_pairs() {
        let sensors = ids(&["A", "B", "C"]);
        let mut detector = ClusterDetector::default();
        tick(&mut detector, &sensors, &[72.0, 73.0, 74.0]);

        assert_eq!(detector.hard_clusters().len(), 1);
        assert_eq!(detector.hard_clusters()[0].members, set(&["A", "B", "C"]));
        assert!(detector.hard_clusters()[0].is_active);
        assert!(detector.soft_clusters().is_empty());
    }

    #[test]
    fn test_partial_triple_is_soft() {
        let sensors = ids(&["A", "B", "C"]);
        let mut detector = ClusterDetector::default();
        tick(&mut detector, &sensors, &[72.0, 72.5, 150.0]);

        assert!(detector.hard_clusters().is_empty());
        assert_eq!(detector.soft_clusters().len(), 1);
        assert_eq!(detector.soft_clusters()[0].members, set(&["A", "B", "C"]));
    }

    #[test]
    fn test_no_clusters_when_far_apart() {
        let sensors = ids(&["A", "B", "C"]);
        let mut detector = ClusterDetector::default();
        tick(&mut detector, &sensors, &[50.0, 100.0, 150.0]);

        assert!(detector.hard_clusters().is_empty());
        assert!(detector.soft_clusters().is_empty());
    }

    #[test]
    fn test_pair_only_soft() {
        let sensors = ids(&["A", "B"]);
        let mut detector = ClusterDetector::default();
        tick(&mut detector, &sensors, &[80.0, 80.0]);

        assert!(detector.hard_clusters().is_empty());
        assert_eq!(detector.soft_clusters().len(), 1);
        assert_eq!(detector.soft_clusters()[0].members, set(&["A", "B"]));
    }

    #[test]
    fn test_identity_persists_across_ticks() {
        let sensors = ids(&["A", "B", "C"]);
        let mut detector = ClusterDetector::default();

        tick(&mut detector, &sensors, &[72.0, 73.0, 74.0]);
        for _ in 0..3 {
            tick(&mut detector, &sensors, &[50.0, 100.0, 150.0]);
        }
        assert_eq!(detector.hard_clusters().len(), 1);
        assert!(!detector.hard_clusters()[0].is_active);
        assert_eq!(detector.hard_clusters()[0].activation_count, 1);

        tick(&mut detector, &sensors, &[74.0, 73.0, 72.0]);
        assert_eq!(detector.hard_clusters().len(), 1);
        assert!(detector.hard_clusters()[0].is_active);
        assert_eq!(detector.hard_clusters()[0].activation_count, 2);
    }

    #[test]
    fn test_transitions_reported() {
        let sensors = ids(&["A", "B", "C"]);
        let mut detector = ClusterDetector::default();

        let matrices = PairwiseMatrices::compute(&[72.0, 73.0, 74.0]);
        let up = detector.update(&sensors, &matrices.proximity).unwrap();
        assert_eq!(up.len(), 1);
        assert!(up[0].activated);
        assert_eq!(up[0].kind, ClusterKind::Hard);

        let same = detector.update(&sensors, &matrices.proximity).unwrap();
        assert!(same.is_empty());

        let far = PairwiseMatrices::compute(&[50.0, 100.0, 150.0]);
        let down = detector.update(&sensors, &far.proximity).unwrap();
        assert_eq!(down.len(), 1);
        assert!(!down[0].activated);
    }

    #[test]
    fn test_dimension_mismatch_leaves_state() {
        let sensors = ids(&["A", "B", "C"]);
        let mut detector = ClusterDetector::default();
        tick(&mut detector, &sensors, &[72.0, 73.0, 74.0]);
        let before = detector.clone();

        let two = PairwiseMatrices::compute(&[72.0, 73.0]);
        let result = detector.update(&sensors, &two.proximity);

        assert_eq!(
            result,
            Err(SyncError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(detector, before);
    }

    #[test]
    fn test_threshold_boundary() {
        let sensors = ids(&["A", "B"]);
        let mut detector = ClusterDetector::new(0.1);
        assert!((detector.proximity_threshold() - 0.9).abs() < 1e-12);

        let proximity =
            PairwiseMatrix::from_rows(vec![vec![1.0, 0.95], vec![0.95, 1.0]]).unwrap();
        detector.update(&sensors, &proximity).unwrap();
        assert_eq!(detector.active_soft_clusters().len(), 1);
    }
}
