//! Canonical per-period record sets consumed from the parsing layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::entity::{PeriodKey, SourceTag};
use crate::error::GraphError;

/// Which side of a dependency pair carries the entity name.
///
/// The two historical registry layouts disagree: one keys its dependency
/// dictionary by name, the other by cross-reference key. Every consumer of
/// a [`DependencyPair`] must go through [`SchemaVariant::orient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// `(key, value) = (name, xref)`.
    NameKeyed,
    /// `(key, value) = (xref, name)`.
    XrefKeyed,
}

impl SchemaVariant {
    /// Split a pair into `(name, xref)` according to this schema.
    pub fn orient<'a>(&self, pair: &'a DependencyPair) -> (&'a str, &'a str) {
        match self {
            Self::NameKeyed => (pair.0.as_str(), pair.1.as_str()),
            Self::XrefKeyed => (pair.1.as_str(), pair.0.as_str()),
        }
    }
}

impl FromStr for SchemaVariant {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name_keyed" => Ok(Self::NameKeyed),
            "xref_keyed" => Ok(Self::XrefKeyed),
            _ => Err(GraphError::InvalidConfig(format!("unknown schema variant: {s}"))),
        }
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameKeyed => write!(f, "name_keyed"),
            Self::XrefKeyed => write!(f, "xref_keyed"),
        }
    }
}

/// One raw `(key, value)` dependency entry. Orientation depends on the
/// record set's [`SchemaVariant`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyPair(pub String, pub String);

impl DependencyPair {
    /// Create a pair exactly as it appears in the raw dictionary.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self(key.into(), value.into())
    }
}

/// Metadata for one entity listed in a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity name.
    pub name: String,
    /// Cross-reference key, when the source provides one.
    #[serde(default)]
    pub xref: Option<String>,
}

impl EntityRecord {
    /// Create an entity record.
    pub fn new(name: impl Into<String>, xref: Option<&str>) -> Self {
        Self {
            name: name.into(),
            xref: xref.map(str::to_string),
        }
    }
}

/// Everything known about one dated period from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecordSet {
    /// Period these records describe.
    pub period: PeriodKey,
    /// Source the records came from.
    pub source: SourceTag,
    /// Orientation of the dependency dictionary. `None` means untagged.
    #[serde(default)]
    pub schema: Option<SchemaVariant>,
    /// Entities listed in this period.
    pub entities: Vec<EntityRecord>,
    /// `entity name -> raw dependency pairs`.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<DependencyPair>>,
}

impl PeriodRecordSet {
    /// Create an empty record set.
    pub fn new(period: PeriodKey, source: SourceTag, schema: Option<SchemaVariant>) -> Self {
        Self {
            period,
            source,
            schema,
            entities: Vec::new(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Add an entity.
    pub fn with_entity(mut self, name: &str, xref: Option<&str>) -> Self {
        self.entities.push(EntityRecord::new(name, xref));
        self
    }

    /// Add a raw dependency pair for `entity`.
    pub fn with_dependency(mut self, entity: &str, key: &str, value: &str) -> Self {
        self.dependencies
            .entry(entity.to_string())
            .or_default()
            .push(DependencyPair::new(key, value));
        self
    }

    /// Parse a record set from canonical JSON.
    ///
    /// Any parse or validation failure is reported as
    /// [`GraphError::MalformedPeriodRecord`] against `period`.
    pub fn from_json_slice(period: &PeriodKey, bytes: &[u8]) -> Result<Self, GraphError> {
        let records: Self = serde_json::from_slice(bytes).map_err(|e| {
            GraphError::MalformedPeriodRecord {
                period: period.clone(),
                reason: e.to_string(),
            }
        })?;
        if &records.period != period {
            return Err(GraphError::MalformedPeriodRecord {
                period: period.clone(),
                reason: format!("record set is dated {}", records.period),
            });
        }
        records.validate()?;
        Ok(records)
    }

    /// Check structural sanity: non-empty entity names.
    pub fn validate(&self) -> Result<(), GraphError> {
        if let Some(bad) = self.entities.iter().find(|e| e.name.trim().is_empty()) {
            return Err(GraphError::MalformedPeriodRecord {
                period: self.period.clone(),
                reason: format!("entity with empty name (xref {:?})", bad.xref),
            });
        }
        Ok(())
    }

    /// Number of raw dependency pairs across all entities.
    pub fn pair_count(&self) -> usize {
        self.dependencies.values().map(Vec::len).sum()
    }
}
