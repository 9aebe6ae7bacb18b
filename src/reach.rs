//! Breadth-first transitive closure over any successor-list graph.
//!
//! One traversal serves every use: dependencies over a snapshot, dependents
//! over its transpose, and closures over a union graph.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::error::GraphError;
use crate::index::EntityIndex;
use crate::store::{Snapshot, SuccessorGraph};
use crate::types::EntityId;

/// Ids reachable from a seed in one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyClosure {
    /// Traversal start. Never a member.
    pub seed: Option<EntityId>,
    /// Reachable ids, ascending.
    pub members: BTreeSet<EntityId>,
    /// Largest hop count at which a member was found.
    pub depth: u32,
}

impl DependencyClosure {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether nothing is reachable.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `id` is reachable.
    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter().copied()
    }
}

/// BFS closure solver.
///
/// Each node is enqueued at most once, so cycles terminate and the cost
/// is O(V + E) per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachabilitySolver {
    max_hops: Option<u32>,
}

impl ReachabilitySolver {
    /// Unbounded solver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop expanding after `hops` edges from the seed.
    pub fn with_max_hops(mut self, hops: u32) -> Self {
        self.max_hops = Some(hops);
        self
    }

    /// Everything reachable from `seed` in ≥1 hops, never entering `exclude`.
    ///
    /// A seed outside the graph's populated range yields an empty closure.
    pub fn closure<G>(&self, graph: &G, seed: EntityId, exclude: &BTreeSet<EntityId>) -> DependencyClosure
    where
        G: SuccessorGraph + ?Sized,
    {
        let mut closure = DependencyClosure {
            seed: Some(seed),
            ..DependencyClosure::default()
        };
        if !graph.contains_node(seed) {
            return closure;
        }

        let bound = graph.node_bound();
        let mut visited = vec![false; bound];
        for id in exclude {
            if let Some(slot) = visited.get_mut(id.index()) {
                *slot = true;
            }
        }
        visited[seed.index()] = true;

        let mut queue = VecDeque::new();
        queue.push_back((seed, 0u32));
        while let Some((current, hops)) = queue.pop_front() {
            if self.max_hops.is_some_and(|max| hops >= max) {
                continue;
            }
            for &next in graph.successors(current) {
                let Some(seen) = visited.get_mut(next.index()) else {
                    continue;
                };
                if *seen {
                    continue;
                }
                *seen = true;
                closure.members.insert(next);
                closure.depth = closure.depth.max(hops + 1);
                queue.push_back((next, hops + 1));
            }
        }
        closure
    }

    /// Everything that transitively depends on `seed` in this snapshot.
    pub fn dependents(&self, snapshot: &Snapshot, seed: EntityId, exclude: &BTreeSet<EntityId>) -> DependencyClosure {
        self.closure(&snapshot.transpose(), seed, exclude)
    }

    /// Closure addressed by entity names.
    ///
    /// Fails closed on an unknown seed or exclusion name.
    pub fn closure_by_name<G>(
        &self,
        index: &EntityIndex,
        graph: &G,
        seed: &str,
        exclude: &[&str],
    ) -> Result<DependencyClosure, GraphError>
    where
        G: SuccessorGraph + ?Sized,
    {
        let seed = index.id(seed)?;
        let exclude = exclude
            .iter()
            .map(|name| index.id(name))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(self.closure(graph, seed, &exclude))
    }

    /// Closure size for every populated id, indexed by row.
    pub fn closure_sizes<G>(&self, graph: &G) -> Vec<usize>
    where
        G: SuccessorGraph + Sync + ?Sized,
    {
        let none = BTreeSet::new();
        (0..graph.node_bound())
            .into_par_iter()
            .map(|row| {
                let id = EntityId::from_index(row);
                if graph.contains_node(id) {
                    self.closure(graph, id, &none).len()
                } else {
                    0
                }
            })
            .collect()
    }
}
