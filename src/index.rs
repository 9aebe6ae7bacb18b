//! Stable entity identity across all periods.
//!
//! The index is built in one sequential pass over chronologically sorted
//! record sets and is read-only afterwards. Ids are dense (`1..=N`) and
//! assigned in first-seen order; new entities within one period are
//! ordered by byte-wise ascending name.
//!
//! ## Identity
//!
//! Two records denote the same entity when their names match or their
//! cross-reference keys match. A name matched only through its xref becomes
//! an alias of the existing id. When name and xref point at two different
//! ids, the name wins and the conflict is counted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::canonical::canonical_hash_hex;
use crate::catalog::{read_artifact, PeriodInput};
use crate::error::{BatchReport, GraphError};
use crate::types::{EntityId, PeriodKey, PeriodRecordSet, SourceTag};
use crate::GRAPH_KERNEL_SCHEMA_VERSION;

/// One indexed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEntity {
    /// Dense id.
    pub id: EntityId,
    /// Canonical name (the name it was first seen under).
    pub name: String,
    /// Period of first observation.
    pub first_seen: PeriodKey,
    /// Source of the first observation.
    pub source: SourceTag,
    /// Other names merged into this entity by cross-reference.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Every cross-reference key resolving to this entity.
    #[serde(default)]
    pub xrefs: Vec<String>,
}

/// Per-period presence counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCount {
    /// Distinct entities listed in the period.
    pub present: usize,
    /// Entities first seen in the period.
    pub introduced: usize,
}

/// Identity reconciliation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityStats {
    /// Records merged into an existing id through their xref.
    pub merged_by_xref: usize,
    /// Records whose name and xref pointed at different ids.
    pub conflicts: usize,
}

/// Persisted form of an [`EntityIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIndexDocument {
    /// Schema version of the document.
    pub schema_version: String,
    /// Number of entities.
    pub total: usize,
    /// Entities in id order.
    pub entities: Vec<IndexedEntity>,
    /// Presence counters keyed by period.
    pub period_counts: BTreeMap<PeriodKey, PeriodCount>,
    /// Identity reconciliation counters.
    #[serde(default)]
    pub identity: IdentityStats,
}

/// Immutable name/id mapping shared by every later stage.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entities: Vec<IndexedEntity>,
    by_name: BTreeMap<String, EntityId>,
    by_xref: BTreeMap<String, EntityId>,
    period_counts: BTreeMap<PeriodKey, PeriodCount>,
    identity: IdentityStats,
}

impl EntityIndex {
    /// Build from selected period inputs.
    ///
    /// Inputs are sorted chronologically first. A period that fails to load
    /// is skipped and reported, never fatal.
    pub fn build(inputs: &[PeriodInput]) -> (Self, BatchReport) {
        let mut ordered: Vec<&PeriodInput> = inputs.iter().collect();
        ordered.sort_by(|a, b| a.period.cmp(&b.period));

        let mut builder = EntityIndexBuilder::new();
        let mut report = BatchReport::new();
        for input in ordered {
            match input.load() {
                Ok(records) => {
                    builder.observe(&records);
                    report.processed(input.period.clone());
                }
                Err(e) => report.skip(input.period.clone(), &e),
            }
        }
        let index = builder.finish();
        tracing::info!(
            entities = index.len(),
            processed = report.processed.len(),
            skipped = report.skipped_count(),
            merged_by_xref = index.identity.merged_by_xref,
            conflicts = index.identity.conflicts,
            "Built entity index"
        );
        (index, report)
    }

    /// Number of entities (`N`).
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity is indexed.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up by name or alias.
    pub fn get(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    /// Look up by name or alias, failing on a miss.
    pub fn id(&self, name: &str) -> Result<EntityId, GraphError> {
        self.get(name)
            .ok_or_else(|| GraphError::UnknownEntity(name.to_string()))
    }

    /// Look up by cross-reference key.
    pub fn resolve_xref(&self, xref: &str) -> Option<EntityId> {
        self.by_xref.get(xref).copied()
    }

    /// Full entry for an id.
    pub fn entity(&self, id: EntityId) -> Result<&IndexedEntity, GraphError> {
        self.entities
            .get(id.index())
            .ok_or(GraphError::UnknownEntityId(id))
    }

    /// Canonical name of an id.
    pub fn name(&self, id: EntityId) -> Result<&str, GraphError> {
        self.entity(id).map(|e| e.name.as_str())
    }

    /// Period an id was first observed.
    pub fn first_seen(&self, id: EntityId) -> Result<&PeriodKey, GraphError> {
        self.entity(id).map(|e| &e.first_seen)
    }

    /// Source of an id's first observation.
    pub fn source_tag(&self, id: EntityId) -> Result<&SourceTag, GraphError> {
        self.entity(id).map(|e| &e.source)
    }

    /// All entities in id order.
    pub fn entities(&self) -> &[IndexedEntity] {
        &self.entities
    }

    /// Presence counters per period.
    pub fn period_counts(&self) -> &BTreeMap<PeriodKey, PeriodCount> {
        &self.period_counts
    }

    /// Identity reconciliation counters.
    pub fn identity_stats(&self) -> IdentityStats {
        self.identity
    }

    /// Number of entities first seen at or before `period`.
    ///
    /// Ids are first-seen ordered, so this is a prefix length.
    pub fn populated_at(&self, period: &PeriodKey) -> usize {
        self.entities.partition_point(|e| &e.first_seen <= period)
    }

    /// Persisted form.
    pub fn to_document(&self) -> EntityIndexDocument {
        EntityIndexDocument {
            schema_version: GRAPH_KERNEL_SCHEMA_VERSION.to_string(),
            total: self.entities.len(),
            entities: self.entities.clone(),
            period_counts: self.period_counts.clone(),
            identity: self.identity,
        }
    }

    /// Restore from a persisted document.
    ///
    /// Ids must be dense and first-seen ordered, every name, alias and xref
    /// must resolve to exactly one id, and period counters must fit the
    /// entity total.
    pub fn from_document(doc: EntityIndexDocument) -> Result<Self, GraphError> {
        let corrupt = |reason: String| GraphError::CorruptArtifact {
            what: "entity index document".to_string(),
            reason,
        };
        if doc.total != doc.entities.len() {
            return Err(corrupt(format!(
                "total {} but {} entities",
                doc.total,
                doc.entities.len()
            )));
        }

        let mut index = Self {
            period_counts: doc.period_counts,
            identity: doc.identity,
            ..Self::default()
        };
        for (row, entity) in doc.entities.into_iter().enumerate() {
            if entity.id != EntityId::from_index(row) {
                return Err(corrupt(format!("id {} at row {}", entity.id, row)));
            }
            if let Some(prev) = index.entities.last() {
                if prev.first_seen > entity.first_seen {
                    return Err(corrupt(format!("id {} seen before id {}", entity.id, prev.id)));
                }
            }
            for name in std::iter::once(&entity.name).chain(&entity.aliases) {
                if let Some(other) = index.by_name.insert(name.clone(), entity.id) {
                    if other != entity.id {
                        return Err(corrupt(format!("name {name:?} maps to ids {other} and {}", entity.id)));
                    }
                }
            }
            for xref in &entity.xrefs {
                if let Some(other) = index.by_xref.insert(xref.clone(), entity.id) {
                    if other != entity.id {
                        return Err(corrupt(format!("xref {xref:?} maps to ids {other} and {}", entity.id)));
                    }
                }
            }
            index.entities.push(entity);
        }

        let total = index.entities.len();
        let mut introduced = 0usize;
        for (period, count) in &index.period_counts {
            if count.introduced > count.present || count.present > total {
                return Err(corrupt(format!(
                    "period {period} lists {} present, {} introduced of {total}",
                    count.present, count.introduced
                )));
            }
            introduced += count.introduced;
        }
        if introduced > total {
            return Err(corrupt(format!("{introduced} introductions for {total} entities")));
        }
        Ok(index)
    }

    /// Write the document as JSON.
    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        let json = serde_json::to_vec_pretty(&self.to_document())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a JSON document written by [`EntityIndex::save`].
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let bytes = read_artifact(path)?;
        let doc: EntityIndexDocument = serde_json::from_slice(&bytes)?;
        Self::from_document(doc)
    }

    /// Fingerprint of the persisted form.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&self.to_document())
    }
}

/// Sequential, append-only index construction.
#[derive(Debug, Default)]
pub struct EntityIndexBuilder {
    index: EntityIndex,
    last_period: Option<PeriodKey>,
}

impl EntityIndexBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one period's entity records into the index.
    ///
    /// Periods must arrive in chronological order; an out-of-order period
    /// is rejected so ids stay first-seen ordered.
    pub fn observe(&mut self, records: &PeriodRecordSet) -> Option<PeriodCount> {
        if let Some(last) = &self.last_period {
            if &records.period < last {
                tracing::warn!(
                    period = %records.period,
                    last = %last,
                    "Out-of-order period ignored"
                );
                return None;
            }
        }
        self.last_period = Some(records.period.clone());

        let mut ordered: Vec<_> = records.entities.iter().collect();
        ordered.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        let index = &mut self.index;
        let mut present = BTreeSet::new();
        let mut introduced = 0usize;

        for record in ordered {
            let by_name = index.by_name.get(&record.name).copied();
            let by_xref = record
                .xref
                .as_deref()
                .and_then(|x| index.by_xref.get(x).copied());

            let id = match (by_name, by_xref) {
                (Some(named), Some(keyed)) if named != keyed => {
                    index.identity.conflicts += 1;
                    tracing::warn!(
                        period = %records.period,
                        name = %record.name,
                        name_id = %named,
                        xref_id = %keyed,
                        "Identity conflict, keeping name match"
                    );
                    named
                }
                (Some(named), _) => named,
                (None, Some(keyed)) => {
                    index.identity.merged_by_xref += 1;
                    tracing::debug!(
                        period = %records.period,
                        name = %record.name,
                        id = %keyed,
                        "Merged by cross-reference"
                    );
                    index.by_name.insert(record.name.clone(), keyed);
                    index.entities[keyed.index()].aliases.push(record.name.clone());
                    keyed
                }
                (None, None) => {
                    let id = EntityId::from_index(index.entities.len());
                    index.entities.push(IndexedEntity {
                        id,
                        name: record.name.clone(),
                        first_seen: records.period.clone(),
                        source: records.source.clone(),
                        aliases: Vec::new(),
                        xrefs: Vec::new(),
                    });
                    index.by_name.insert(record.name.clone(), id);
                    introduced += 1;
                    id
                }
            };

            if let Some(xref) = &record.xref {
                if !index.by_xref.contains_key(xref) {
                    index.by_xref.insert(xref.clone(), id);
                    index.entities[id.index()].xrefs.push(xref.clone());
                }
            }
            present.insert(id);
        }

        let count = PeriodCount {
            present: present.len(),
            introduced,
        };
        index.period_counts.insert(records.period.clone(), count);
        Some(count)
    }

    /// Freeze the index.
    pub fn finish(self) -> EntityIndex {
        self.index
    }
}
