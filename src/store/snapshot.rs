//! Compressed sparse row adjacency for one period.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::SuccessorGraph;
use crate::canonical::canonical_hash_hex;
use crate::types::{Edge, EntityId, PeriodKey};
use crate::GRAPH_KERNEL_SCHEMA_VERSION;

/// Immutable dependency relation for one period.
///
/// Row `i` holds the sorted dependencies of id `i + 1`. Entries are boolean:
/// self-loops are dropped and repeated edges collapse to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    period: PeriodKey,
    dim: usize,
    populated: usize,
    offsets: Vec<usize>,
    targets: Vec<EntityId>,
}

/// Internal struct for computing the snapshot fingerprint.
#[derive(Serialize)]
struct SnapshotIdInput<'a> {
    schema_version: &'a str,
    period: &'a PeriodKey,
    dim: usize,
    populated: usize,
    edges: Vec<(u32, u32)>,
}

impl Snapshot {
    /// Build from an edge list over a `dim`-sized id space.
    ///
    /// Self-loops and edges touching ids beyond `dim` are dropped.
    /// `populated` is widened to cover every edge endpoint.
    pub fn from_edges<I>(period: PeriodKey, dim: usize, populated: usize, edges: I) -> Self
    where
        I: IntoIterator<Item = Edge>,
    {
        let edges: BTreeSet<Edge> = edges
            .into_iter()
            .filter(|e| !e.is_self_loop())
            .filter(|e| e.source.index() < dim && e.target.index() < dim)
            .collect();

        let mut offsets = vec![0usize; dim + 1];
        let mut targets = Vec::with_capacity(edges.len());
        let mut max_endpoint = 0usize;
        for edge in &edges {
            offsets[edge.source.index() + 1] += 1;
            targets.push(edge.target);
            max_endpoint = max_endpoint.max(edge.source.get() as usize).max(edge.target.get() as usize);
        }
        for row in 0..dim {
            offsets[row + 1] += offsets[row];
        }

        Self {
            period,
            dim,
            populated: populated.max(max_endpoint).min(dim),
            offsets,
            targets,
        }
    }

    /// A snapshot with no edges.
    pub fn empty(period: PeriodKey, dim: usize, populated: usize) -> Self {
        Self::from_edges(period, dim, populated, std::iter::empty())
    }

    /// Period of this snapshot.
    pub fn period(&self) -> &PeriodKey {
        &self.period
    }

    /// Global index size (`N`).
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of ids observed at or before this period.
    pub fn populated(&self) -> usize {
        self.populated
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    /// Whether `source` depends on `target`.
    pub fn contains_edge(&self, source: EntityId, target: EntityId) -> bool {
        self.successors(source).binary_search(&target).is_ok()
    }

    /// All edges in canonical `(source, target)` order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.dim).flat_map(move |row| {
            let source = EntityId::from_index(row);
            self.targets[self.offsets[row]..self.offsets[row + 1]]
                .iter()
                .map(move |&target| Edge::new(source, target))
        })
    }

    /// Number of dependencies of `id`.
    pub fn out_degree(&self, id: EntityId) -> usize {
        self.successors(id).len()
    }

    /// Number of dependents of every id, indexed by row.
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0usize; self.dim];
        for target in &self.targets {
            degrees[target.index()] += 1;
        }
        degrees
    }

    /// Ids incident to at least one edge, ascending.
    pub fn active_nodes(&self) -> Vec<EntityId> {
        let mut active = vec![false; self.dim];
        for edge in self.edges() {
            active[edge.source.index()] = true;
            active[edge.target.index()] = true;
        }
        active
            .iter()
            .enumerate()
            .filter(|&(_, &on)| on)
            .map(|(row, _)| EntityId::from_index(row))
            .collect()
    }

    /// The same relation with every edge reversed (dependents view).
    pub fn transpose(&self) -> Self {
        Self::from_edges(
            self.period.clone(),
            self.dim,
            self.populated,
            self.edges().map(|e| e.reversed()),
        )
    }

    /// Keep only edges whose endpoints are both in `members`.
    pub fn restrict(&self, members: &BTreeSet<EntityId>) -> Self {
        Self::from_edges(
            self.period.clone(),
            self.dim,
            self.populated,
            self.edges()
                .filter(|e| members.contains(&e.source) && members.contains(&e.target)),
        )
    }

    /// Deterministic fingerprint over period, dimensions and edges.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&SnapshotIdInput {
            schema_version: GRAPH_KERNEL_SCHEMA_VERSION,
            period: &self.period,
            dim: self.dim,
            populated: self.populated,
            edges: self.edges().map(|e| (e.source.get(), e.target.get())).collect(),
        })
    }
}

impl SuccessorGraph for Snapshot {
    fn node_bound(&self) -> usize {
        self.dim
    }

    fn successors(&self, id: EntityId) -> &[EntityId] {
        let row = id.index();
        if row >= self.dim {
            return &[];
        }
        &self.targets[self.offsets[row]..self.offsets[row + 1]]
    }

    fn contains_node(&self, id: EntityId) -> bool {
        id.index() < self.populated
    }
}
