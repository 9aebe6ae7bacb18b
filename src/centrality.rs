//! Damped random-walk rank per snapshot, and cross-period top-k histories.
//!
//! ## Direction
//!
//! - `Forward` ranks the reversed relation: score flows from a dependency to
//!   its dependents, so entities that reach far outward rank high.
//! - `Backward` ranks the relation as stored: score flows toward
//!   dependencies, so heavily depended-on entities rank high.
//!
//! `rank(S, Backward)` equals `rank(transpose(S), Forward)`.
//!
//! Only active nodes (incident to at least one edge) take part. Dangling and
//! teleport mass are spread uniformly over them; inactive nodes score zero.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::store::{Snapshot, SnapshotStore, SuccessorGraph};
use crate::types::{EntityId, PeriodKey};

/// Which way score flows along dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Dependency to dependent.
    Forward,
    /// Dependent to dependency.
    Backward,
}

impl Direction {
    /// Both directions, forward first.
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Backward];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
        }
    }
}

/// Power-iteration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankPolicy {
    /// Continuation probability, clamped into `[0, 1]` when ranking.
    pub damping: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stop once the L1 change drops below this.
    pub tolerance: f64,
}

impl Default for RankPolicy {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-10,
        }
    }
}

/// Scores for one snapshot and direction, indexed by row (`id - 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankVector {
    /// Direction ranked.
    pub direction: Direction,
    /// Non-negative score per row.
    pub scores: Vec<f64>,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the tolerance was reached before the cap.
    pub converged: bool,
}

impl RankVector {
    /// Score of one id; zero when out of range.
    pub fn score(&self, id: EntityId) -> f64 {
        self.scores.get(id.index()).copied().unwrap_or(0.0)
    }

    /// Sum of all scores: 1 (within tolerance) when any edge exists, else 0.
    pub fn total(&self) -> f64 {
        self.scores.iter().sum()
    }

    /// The `k` highest-scoring ids, see [`top_k`].
    pub fn top_k(&self, k: usize) -> Vec<Option<(EntityId, f64)>> {
        top_k(self, k)
    }
}

/// Rank any successor-list graph.
///
/// No edges yields an all-zero vector.
pub fn rank_graph<G>(graph: &G, direction: Direction, policy: &RankPolicy) -> RankVector
where
    G: SuccessorGraph + ?Sized,
{
    let bound = graph.node_bound();
    let mut scores = vec![0.0; bound];

    // Flow edges in row space, oriented the way score moves.
    let mut flow: Vec<(usize, usize)> = Vec::new();
    for row in 0..bound {
        for target in graph.successors(EntityId::from_index(row)) {
            let edge = (row, target.index());
            flow.push(match direction {
                Direction::Backward => edge,
                Direction::Forward => (edge.1, edge.0),
            });
        }
    }
    if flow.is_empty() {
        return RankVector {
            direction,
            scores,
            iterations: 0,
            converged: true,
        };
    }

    // Compact the active rows.
    let mut compact = vec![usize::MAX; bound];
    let mut active = Vec::new();
    for &(a, b) in &flow {
        for row in [a, b] {
            if compact[row] == usize::MAX {
                compact[row] = 0;
                active.push(row);
            }
        }
    }
    active.sort_unstable();
    for (slot, &row) in active.iter().enumerate() {
        compact[row] = slot;
    }

    let n = active.len();
    let mut out_degree = vec![0usize; n];
    let flow: Vec<(usize, usize)> = flow
        .into_iter()
        .map(|(a, b)| (compact[a], compact[b]))
        .collect();
    for &(a, _) in &flow {
        out_degree[a] += 1;
    }

    // out-of-range damping would make the teleport term negative
    let d = if policy.damping.is_nan() {
        RankPolicy::default().damping
    } else {
        policy.damping.clamp(0.0, 1.0)
    };
    let uniform = 1.0 / n as f64;
    let mut current = vec![uniform; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < policy.max_iterations {
        iterations += 1;
        let dangling: f64 = (0..n)
            .filter(|&i| out_degree[i] == 0)
            .map(|i| current[i])
            .sum();
        let base = (1.0 - d) * uniform + d * dangling * uniform;
        let mut next = vec![base; n];
        for &(a, b) in &flow {
            next[b] += d * current[a] / out_degree[a] as f64;
        }

        let delta: f64 = next.iter().zip(&current).map(|(x, y)| (x - y).abs()).sum();
        current = next;
        if delta < policy.tolerance {
            converged = true;
            break;
        }
    }

    for (slot, &row) in active.iter().enumerate() {
        scores[row] = current[slot];
    }
    RankVector {
        direction,
        scores,
        iterations,
        converged,
    }
}

/// Rank one snapshot.
pub fn rank(snapshot: &Snapshot, direction: Direction, policy: &RankPolicy) -> RankVector {
    rank_graph(snapshot, direction, policy)
}

/// The `k` ids with the largest scores.
///
/// Ties break by ascending id. Always returns `k` slots; slots past the
/// non-zero entries are `None`.
pub fn top_k(vector: &RankVector, k: usize) -> Vec<Option<(EntityId, f64)>> {
    let mut ranked: Vec<(EntityId, f64)> = vector
        .scores
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s > 0.0)
        .map(|(row, &s)| (EntityId::from_index(row), s))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut slots: Vec<Option<(EntityId, f64)>> = ranked.into_iter().take(k).map(Some).collect();
    slots.resize(k, None);
    slots
}

/// Top-k per period plus a dense score table over every entity that was
/// ever in any period's top-k.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankHistory {
    /// Direction ranked.
    pub direction: Direction,
    /// Slots per period.
    pub k: usize,
    /// Top-k per period.
    pub top: BTreeMap<PeriodKey, Vec<Option<(EntityId, f64)>>>,
    /// Ids ever in a top-k, ascending.
    pub tracked: Vec<EntityId>,
    /// `period -> score per tracked id`, aligned with `tracked`.
    pub table: BTreeMap<PeriodKey, Vec<f64>>,
}

impl RankHistory {
    /// Two passes over the store's periods (optionally a sub-range).
    ///
    /// Pass one finds the tracked set from each period's top-k. Pass two
    /// re-ranks with the same routine to fill the dense table, so full
    /// vectors are never held for all periods at once.
    pub fn compute(
        store: &SnapshotStore,
        direction: Direction,
        policy: &RankPolicy,
        k: usize,
        start: Option<&PeriodKey>,
        end: Option<&PeriodKey>,
    ) -> Self {
        let snapshots: Vec<_> = store.range(start, end).collect();

        let top: BTreeMap<PeriodKey, Vec<Option<(EntityId, f64)>>> = snapshots
            .par_iter()
            .map(|(period, snapshot)| {
                let vector = rank(snapshot, direction, policy);
                ((*period).clone(), top_k(&vector, k))
            })
            .collect();

        let tracked: Vec<EntityId> = top
            .values()
            .flatten()
            .flatten()
            .map(|(id, _)| *id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let table: BTreeMap<PeriodKey, Vec<f64>> = snapshots
            .par_iter()
            .map(|(period, snapshot)| {
                let vector = rank(snapshot, direction, policy);
                let row = tracked.iter().map(|id| vector.score(*id)).collect();
                ((*period).clone(), row)
            })
            .collect();

        tracing::info!(
            direction = %direction,
            periods = top.len(),
            tracked = tracked.len(),
            k,
            "Computed rank history"
        );

        Self {
            direction,
            k,
            top,
            tracked,
            table,
        }
    }

    /// Score history of one tracked id, chronologically.
    pub fn series(&self, id: EntityId) -> Option<Vec<(&PeriodKey, f64)>> {
        let column = self.tracked.binary_search(&id).ok()?;
        Some(
            self.table
                .iter()
                .map(|(period, row)| (period, row[column]))
                .collect(),
        )
    }
}
