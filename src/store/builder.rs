//! Materialize one period's dependency records against the global index.
//!
//! The two raw schemas disagree on which side of a dependency pair is the
//! name. Every pair goes through [`SchemaVariant::orient`]; an untagged
//! record set or a pair whose shape contradicts its tag is dropped and
//! counted, never guessed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::snapshot::Snapshot;
use crate::error::GraphError;
use crate::index::EntityIndex;
use crate::types::{DependencyPair, Edge, EntityId, PeriodRecordSet, SchemaVariant};

/// Edge materialization counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeStats {
    /// Raw dependency pairs examined.
    pub pairs_seen: usize,
    /// Distinct edges kept.
    pub emitted: usize,
    /// Pairs resolving to an edge already kept.
    pub duplicates: usize,
    /// Pairs resolving to the depending entity itself.
    pub self_loops: usize,
    /// Pairs whose depending entity is not indexed.
    pub unindexed_source: usize,
    /// Pairs whose dependency is not indexed.
    pub unindexed_target: usize,
    /// Pairs dropped for a missing or contradicted schema tag.
    pub ambiguous: usize,
    /// Unindexed dependency names with drop counts.
    #[serde(default)]
    pub dropped_names: BTreeMap<String, usize>,
}

impl EdgeStats {
    /// Sum another set of counters into this one.
    pub fn merge(&mut self, other: &EdgeStats) {
        self.pairs_seen += other.pairs_seen;
        self.emitted += other.emitted;
        self.duplicates += other.duplicates;
        self.self_loops += other.self_loops;
        self.unindexed_source += other.unindexed_source;
        self.unindexed_target += other.unindexed_target;
        self.ambiguous += other.ambiguous;
        for (name, count) in &other.dropped_names {
            *self.dropped_names.entry(name.clone()).or_default() += count;
        }
    }

    /// Pairs that did not become an edge for a reason other than collapsing.
    pub fn dropped(&self) -> usize {
        self.unindexed_source + self.unindexed_target + self.ambiguous
    }
}

/// Resolution of one dependency pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    Entity(EntityId),
    Unindexed,
    ShapeInconsistent,
}

/// Turns record sets into [`Snapshot`]s over a shared index.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotBuilder<'a> {
    index: &'a EntityIndex,
}

impl<'a> SnapshotBuilder<'a> {
    /// Create a builder over `index`.
    pub fn new(index: &'a EntityIndex) -> Self {
        Self { index }
    }

    /// Build the snapshot for one period.
    pub fn build(&self, records: &PeriodRecordSet) -> (Snapshot, EdgeStats) {
        let mut stats = EdgeStats::default();
        let mut edges = BTreeSet::new();

        for (entity, pairs) in &records.dependencies {
            stats.pairs_seen += pairs.len();

            let Some(schema) = records.schema else {
                stats.ambiguous += pairs.len();
                let err = GraphError::SchemaAmbiguity {
                    period: records.period.clone(),
                    entity: entity.clone(),
                };
                tracing::debug!(error = %err, pairs = pairs.len(), "Untagged dependency record");
                continue;
            };

            let Some(source) = self.index.get(entity) else {
                stats.unindexed_source += pairs.len();
                continue;
            };

            for pair in pairs {
                match self.resolve(schema, pair) {
                    Resolved::Entity(target) if target == source => stats.self_loops += 1,
                    Resolved::Entity(target) => {
                        if !edges.insert(Edge::new(source, target)) {
                            stats.duplicates += 1;
                        }
                    }
                    Resolved::Unindexed => {
                        stats.unindexed_target += 1;
                        let (name, _) = schema.orient(pair);
                        *stats.dropped_names.entry(name.to_string()).or_default() += 1;
                    }
                    Resolved::ShapeInconsistent => {
                        stats.ambiguous += 1;
                        let err = GraphError::SchemaAmbiguity {
                            period: records.period.clone(),
                            entity: entity.clone(),
                        };
                        tracing::debug!(error = %err, schema = %schema, "Pair contradicts schema tag");
                    }
                }
            }
        }
        stats.emitted = edges.len();

        if records.schema.is_none() && stats.ambiguous > 0 {
            tracing::warn!(
                period = %records.period,
                dropped = stats.ambiguous,
                "Record set has no schema tag, all dependencies dropped"
            );
        }
        tracing::debug!(
            period = %records.period,
            emitted = stats.emitted,
            dropped = stats.dropped(),
            ambiguous = stats.ambiguous,
            "Materialized snapshot"
        );

        let populated = self.index.populated_at(&records.period);
        let snapshot = Snapshot::from_edges(records.period.clone(), self.index.len(), populated, edges);
        (snapshot, stats)
    }

    /// Resolve a pair by name first, then by cross-reference key.
    fn resolve(&self, schema: SchemaVariant, pair: &DependencyPair) -> Resolved {
        let (name, xref) = schema.orient(pair);
        let by_name = self.index.get(name);
        let by_xref = self.index.resolve_xref(xref);

        let name_looks_like_xref = by_name.is_none() && self.index.resolve_xref(name).is_some();
        let xref_looks_like_name = by_xref.is_none() && self.index.get(xref).is_some();
        if name_looks_like_xref && xref_looks_like_name {
            return Resolved::ShapeInconsistent;
        }

        match by_name.or(by_xref) {
            Some(id) => Resolved::Entity(id),
            None => Resolved::Unindexed,
        }
    }
}
