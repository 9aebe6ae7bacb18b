//! Per-period closures of one seed and their union graph.
//!
//! ## Flow
//!
//! ```text
//! TemporalQuery → per-period closure (parallel) → PeriodSlice
//!                                                    ↓
//!                           OR of restricted subgraphs → UnionGraph (compact ids)
//! ```
//!
//! Union ids are compact (`1..=M`) and ordered by original id, so the same
//! inputs always produce the same numbering.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::canonical_hash_hex;
use crate::cluster::{cluster_by_first_appearance, ClusterAssignment};
use crate::error::GraphError;
use crate::index::EntityIndex;
use crate::reach::{DependencyClosure, ReachabilitySolver};
use crate::store::{Snapshot, SnapshotStore, SuccessorGraph};
use crate::types::{Edge, EntityId, PeriodKey};

/// What to aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalQuery {
    /// Entity whose dependencies are tracked.
    pub seed: EntityId,
    /// First period; defaults to the seed's first-seen period.
    #[serde(default)]
    pub start: Option<PeriodKey>,
    /// Last period (inclusive); defaults to the latest.
    #[serde(default)]
    pub end: Option<PeriodKey>,
    /// Ids never entered by any closure.
    #[serde(default)]
    pub exclude: BTreeSet<EntityId>,
    /// Whether the seed itself joins every period it is populated in.
    pub include_self: bool,
}

impl TemporalQuery {
    /// Query for `seed` over its whole lifetime, seed included.
    pub fn new(seed: EntityId) -> Self {
        Self {
            seed,
            start: None,
            end: None,
            exclude: BTreeSet::new(),
            include_self: true,
        }
    }

    /// Build a query from names, failing closed on any unknown name.
    pub fn by_name(index: &EntityIndex, seed: &str, exclude: &[&str]) -> Result<Self, GraphError> {
        let seed = index.id(seed)?;
        let exclude = exclude
            .iter()
            .map(|name| index.id(name))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            exclude,
            ..Self::new(seed)
        })
    }

    /// Override the first period.
    pub fn starting_at(mut self, period: PeriodKey) -> Self {
        self.start = Some(period);
        self
    }

    /// Set the last period.
    pub fn ending_at(mut self, period: PeriodKey) -> Self {
        self.end = Some(period);
        self
    }

    /// Add an excluded id.
    pub fn excluding(mut self, id: EntityId) -> Self {
        self.exclude.insert(id);
        self
    }

    /// Set whether the seed joins its own node set.
    pub fn with_self(mut self, include_self: bool) -> Self {
        self.include_self = include_self;
        self
    }
}

/// One period's view of the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSlice {
    /// Period.
    pub period: PeriodKey,
    /// Reachable dependencies (seed and excluded ids never included).
    pub closure: DependencyClosure,
    /// Closure members plus the seed when requested and populated.
    pub active: BTreeSet<EntityId>,
    /// Snapshot edges among `active`.
    pub subgraph: Snapshot,
}

/// OR-merged adjacency over a compact id space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionGraph {
    /// `compact row -> original id`, ascending.
    nodes: Vec<EntityId>,
    /// `original id -> compact id`.
    compact: BTreeMap<EntityId, EntityId>,
    offsets: Vec<usize>,
    targets: Vec<EntityId>,
}

impl UnionGraph {
    /// OR the given relations restricted to `members`, then reindex.
    pub fn build<'a, I>(members: &BTreeSet<EntityId>, relations: I) -> Self
    where
        I: IntoIterator<Item = &'a Snapshot>,
    {
        let nodes: Vec<EntityId> = members.iter().copied().collect();
        let compact: BTreeMap<EntityId, EntityId> = nodes
            .iter()
            .enumerate()
            .map(|(row, &original)| (original, EntityId::from_index(row)))
            .collect();

        let mut edges = BTreeSet::new();
        for relation in relations {
            for edge in relation.edges() {
                if let (Some(&s), Some(&t)) = (compact.get(&edge.source), compact.get(&edge.target)) {
                    edges.insert(Edge::new(s, t));
                }
            }
        }

        let mut offsets = vec![0usize; nodes.len() + 1];
        let mut targets = Vec::with_capacity(edges.len());
        for edge in &edges {
            offsets[edge.source.index() + 1] += 1;
            targets.push(edge.target);
        }
        for row in 0..nodes.len() {
            offsets[row + 1] += offsets[row];
        }

        Self {
            nodes,
            compact,
            offsets,
            targets,
        }
    }

    /// Number of nodes (`M`).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the union is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Original ids in compact order.
    pub fn nodes(&self) -> &[EntityId] {
        &self.nodes
    }

    /// Compact id to original id.
    pub fn original_id(&self, compact: EntityId) -> Option<EntityId> {
        self.nodes.get(compact.index()).copied()
    }

    /// Original id to compact id.
    pub fn compact_id(&self, original: EntityId) -> Option<EntityId> {
        self.compact.get(&original).copied()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    /// Edges in compact ids, canonical order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.nodes.len()).flat_map(move |row| {
            let source = EntityId::from_index(row);
            self.targets[self.offsets[row]..self.offsets[row + 1]]
                .iter()
                .map(move |&target| Edge::new(source, target))
        })
    }

    /// Edges in original ids.
    pub fn original_edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges()
            .map(|e| Edge::new(self.nodes[e.source.index()], self.nodes[e.target.index()]))
    }

    /// Whether the compact edge exists.
    pub fn contains_edge(&self, source: EntityId, target: EntityId) -> bool {
        self.successors(source).binary_search(&target).is_ok()
    }

    /// Deterministic fingerprint over node mapping and edges.
    pub fn fingerprint(&self) -> String {
        let nodes: Vec<u32> = self.nodes.iter().map(|id| id.get()).collect();
        let edges: Vec<(u32, u32)> = self.edges().map(|e| (e.source.get(), e.target.get())).collect();
        canonical_hash_hex(&(nodes, edges))
    }
}

impl SuccessorGraph for UnionGraph {
    fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    fn successors(&self, id: EntityId) -> &[EntityId] {
        let row = id.index();
        if row >= self.nodes.len() {
            return &[];
        }
        &self.targets[self.offsets[row]..self.offsets[row + 1]]
    }
}

/// One period's active nodes and edges in union (compact) ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Period.
    pub period: PeriodKey,
    /// Active compact ids, ascending.
    pub nodes: Vec<EntityId>,
    /// Active compact edges, canonical order.
    pub edges: Vec<Edge>,
}

/// Everything computed for one query.
#[derive(Debug, Clone)]
pub struct TemporalResult {
    /// The query that produced this result, with `start` resolved.
    pub query: TemporalQuery,
    /// Per-period slices, chronologically.
    pub slices: BTreeMap<PeriodKey, PeriodSlice>,
    /// OR of every slice's subgraph.
    pub union: UnionGraph,
}

impl TemporalResult {
    /// Active set per period, original ids.
    pub fn membership(&self) -> BTreeMap<PeriodKey, BTreeSet<EntityId>> {
        self.slices
            .iter()
            .map(|(period, slice)| (period.clone(), slice.active.clone()))
            .collect()
    }

    /// Cluster the union's nodes by first appearance in this query.
    pub fn clusters(&self) -> ClusterAssignment {
        cluster_by_first_appearance(self.union.nodes(), &self.membership())
    }

    /// Per-period frames over the union's compact ids.
    pub fn frames(&self) -> Vec<Frame> {
        self.slices
            .values()
            .map(|slice| {
                let nodes = slice
                    .active
                    .iter()
                    .filter_map(|&id| self.union.compact_id(id))
                    .collect();
                let edges = slice
                    .subgraph
                    .edges()
                    .filter_map(|e| {
                        Some(Edge::new(
                            self.union.compact_id(e.source)?,
                            self.union.compact_id(e.target)?,
                        ))
                    })
                    .collect();
                Frame {
                    period: slice.period.clone(),
                    nodes,
                    edges,
                }
            })
            .collect()
    }
}

/// Runs temporal queries over one index and store.
#[derive(Debug, Clone, Copy)]
pub struct TemporalAggregator<'a> {
    index: &'a EntityIndex,
    store: &'a SnapshotStore,
    solver: ReachabilitySolver,
}

impl<'a> TemporalAggregator<'a> {
    /// Create an aggregator.
    pub fn new(index: &'a EntityIndex, store: &'a SnapshotStore) -> Self {
        Self {
            index,
            store,
            solver: ReachabilitySolver::new(),
        }
    }

    /// Use a custom solver (e.g. hop-bounded).
    pub fn with_solver(mut self, solver: ReachabilitySolver) -> Self {
        self.solver = solver;
        self
    }

    /// Closures per period plus their union.
    ///
    /// Fails only on an unknown seed. A seed that is populated in no period
    /// of the range yields an empty union.
    pub fn run(&self, query: &TemporalQuery) -> Result<TemporalResult, GraphError> {
        let entity = self.index.entity(query.seed)?;
        let mut query = query.clone();
        if query.start.is_none() {
            query.start = Some(entity.first_seen.clone());
        }

        let snapshots: Vec<_> = self
            .store
            .range(query.start.as_ref(), query.end.as_ref())
            .collect();

        let slices: BTreeMap<PeriodKey, PeriodSlice> = snapshots
            .par_iter()
            .map(|(period, snapshot)| {
                let slice = self.slice(snapshot, &query);
                ((*period).clone(), slice)
            })
            .collect();

        let members: BTreeSet<EntityId> = slices
            .values()
            .flat_map(|s| s.active.iter().copied())
            .collect();
        let union = UnionGraph::build(&members, slices.values().map(|s| &s.subgraph));

        tracing::info!(
            seed = %entity.name,
            periods = slices.len(),
            nodes = union.len(),
            edges = union.edge_count(),
            "Aggregated temporal dependencies"
        );
        Ok(TemporalResult {
            query,
            slices,
            union,
        })
    }

    /// Name-addressed convenience over [`TemporalAggregator::run`].
    pub fn run_by_name(&self, seed: &str, exclude: &[&str]) -> Result<TemporalResult, GraphError> {
        self.run(&TemporalQuery::by_name(self.index, seed, exclude)?)
    }

    fn slice(&self, snapshot: &Snapshot, query: &TemporalQuery) -> PeriodSlice {
        let closure = self.solver.closure(snapshot, query.seed, &query.exclude);
        let mut active = closure.members.clone();
        if query.include_self && snapshot.contains_node(query.seed) {
            active.insert(query.seed);
        }
        let subgraph = snapshot.restrict(&active);
        PeriodSlice {
            period: snapshot.period().clone(),
            closure,
            active,
            subgraph,
        }
    }
}
