//! Structural grouping by first appearance, and a separate presentation
//! step that folds small groups into "other".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::types::{EntityId, PeriodKey};

/// Cluster ids for a set of entities.
///
/// Cluster `c` holds the entities whose first appearance in the filtered
/// membership was `periods[c]`; ids follow chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// Cluster of each assigned entity.
    pub clusters: BTreeMap<EntityId, u32>,
    /// First-appearance period of each cluster.
    pub periods: Vec<PeriodKey>,
    /// Member count of each cluster.
    pub sizes: Vec<usize>,
}

impl ClusterAssignment {
    /// Cluster of one entity. `None` when it never appeared.
    pub fn cluster_of(&self, id: EntityId) -> Option<u32> {
        self.clusters.get(&id).copied()
    }

    /// First-appearance period of a cluster.
    pub fn period_of(&self, cluster: u32) -> Option<&PeriodKey> {
        self.periods.get(cluster as usize)
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    /// Whether there are no clusters.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Assign each entity the cluster of the first period it is a member of.
///
/// Entities that are members of no period stay unassigned. Only periods
/// that introduce at least one entity get a cluster id.
pub fn cluster_by_first_appearance(
    entities: &[EntityId],
    per_period_membership: &BTreeMap<PeriodKey, BTreeSet<EntityId>>,
) -> ClusterAssignment {
    let mut pending: BTreeSet<EntityId> = entities.iter().copied().collect();
    let mut assignment = ClusterAssignment::default();

    for (period, members) in per_period_membership {
        if pending.is_empty() {
            break;
        }
        let fresh: Vec<EntityId> = members.iter().copied().filter(|id| pending.contains(id)).collect();
        if fresh.is_empty() {
            continue;
        }
        let cluster = assignment.periods.len() as u32;
        for id in &fresh {
            pending.remove(id);
            assignment.clusters.insert(*id, cluster);
        }
        assignment.periods.push(period.clone());
        assignment.sizes.push(fresh.len());
    }
    assignment
}

/// How one entity should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationBucket {
    /// A cluster large enough to show on its own.
    Cluster(u32),
    /// Everything in small clusters.
    Other,
}

impl fmt::Display for PresentationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster(c) => write!(f, "{c}"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Fold clusters with fewer than `min_size` members into [`PresentationBucket::Other`].
pub fn bucket_small_clusters(
    assignment: &ClusterAssignment,
    min_size: usize,
) -> BTreeMap<EntityId, PresentationBucket> {
    assignment
        .clusters
        .iter()
        .map(|(&id, &cluster)| {
            let size = assignment.sizes.get(cluster as usize).copied().unwrap_or(0);
            let bucket = if size >= min_size {
                PresentationBucket::Cluster(cluster)
            } else {
                PresentationBucket::Other
            };
            (id, bucket)
        })
        .collect()
}
