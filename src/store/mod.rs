//! Per-period adjacency storage.
//!
//! Every snapshot is sized to the global index (`N` rows), so ids compare
//! across periods without translation.

pub mod builder;
pub mod memory;
pub mod smat;
pub mod snapshot;

use crate::types::EntityId;

/// Anything that yields O(1) successor lists over 1-based ids.
///
/// Implementations must return successors in ascending id order so every
/// traversal over them is deterministic.
pub trait SuccessorGraph {
    /// Ids `1..=node_bound()` may appear in the graph.
    fn node_bound(&self) -> usize;

    /// Direct successors of `id`. Out-of-range ids have none.
    fn successors(&self, id: EntityId) -> &[EntityId];

    /// Whether `id` lies in the populated range and may seed a traversal.
    fn contains_node(&self, id: EntityId) -> bool {
        id.index() < self.node_bound()
    }
}

pub use builder::{EdgeStats, SnapshotBuilder};
pub use memory::SnapshotStore;
pub use snapshot::Snapshot;
