//! Edge type for dependency snapshots.

use serde::{Deserialize, Serialize};
use super::entity::EntityId;

/// Dependency edge: `source` requires `target`.
///
/// Implements `Ord` for deterministic ordering: (source, target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Dependent entity.
    pub source: EntityId,
    /// Dependency.
    pub target: EntityId,
}

impl Edge {
    /// Create a new edge.
    pub fn new(source: EntityId, target: EntityId) -> Self {
        Self { source, target }
    }

    /// Whether this edge points at its own source.
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// The same edge with direction flipped.
    pub fn reversed(&self) -> Self {
        Self::new(self.target, self.source)
    }
}

// Canonical ordering: source, then target
impl PartialOrd for Edge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Edge {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.source.cmp(&other.source) {
            std::cmp::Ordering::Equal => self.target.cmp(&other.target),
            ord => ord,
        }
    }
}
