//! Error taxonomy and per-batch degradation reporting.
//!
//! Single queries (one closure, one rank, one union) fail closed with a
//! typed [`GraphError`]. Batch stages never abort on one bad period: they
//! return their result alongside a [`BatchReport`] listing what was skipped.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::EdgeStats;
use crate::types::{EntityId, PeriodKey};

/// Error type for graph kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A required index, snapshot, or artifact is absent.
    #[error("Missing artifact: {what}")]
    MissingArtifact {
        /// What was being looked for.
        what: String,
    },
    /// Name lookup miss.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
    /// Id lookup miss (id beyond the index).
    #[error("Unknown entity id: {0}")]
    UnknownEntityId(EntityId),
    /// Zero or otherwise unusable raw id.
    #[error("Invalid entity id: {0}")]
    InvalidEntityId(u32),
    /// One period's records could not be parsed.
    #[error("Malformed records for period {period}: {reason}")]
    MalformedPeriodRecord {
        /// Period whose records failed.
        period: PeriodKey,
        /// Parser or validation message.
        reason: String,
    },
    /// A dependency record's schema tag is missing or contradicts its shape.
    #[error("Schema ambiguity in period {period} for entity {entity}")]
    SchemaAmbiguity {
        /// Period of the offending record.
        period: PeriodKey,
        /// Entity whose dependencies were affected.
        entity: String,
    },
    /// A persisted artifact exists but violates its format.
    #[error("Corrupt artifact {what}: {reason}")]
    CorruptArtifact {
        /// Which artifact.
        what: String,
        /// What was wrong with it.
        reason: String,
    },
    /// Unparseable period key.
    #[error("Invalid period key: {0}")]
    InvalidPeriod(String),
    /// Configuration could not be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl GraphError {
    /// Shorthand for a missing file.
    pub fn missing_path(path: &std::path::Path) -> Self {
        Self::MissingArtifact {
            what: path.display().to_string(),
        }
    }

    /// Shorthand for a missing period snapshot.
    pub fn missing_period(period: &PeriodKey) -> Self {
        Self::MissingArtifact {
            what: format!("snapshot for period {period}"),
        }
    }
}

/// A period left out of a batch, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPeriod {
    /// Period that was skipped.
    pub period: PeriodKey,
    /// Human-readable reason.
    pub reason: String,
    /// Source file, when the failure came from one.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Outcome counters for a multi-period batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Periods that produced a result.
    pub processed: Vec<PeriodKey>,
    /// Periods that were skipped.
    pub skipped: Vec<SkippedPeriod>,
    /// Edge drop counters summed over processed periods.
    pub edges: EdgeStats,
}

impl BatchReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a skipped period and log it.
    pub fn skip(&mut self, period: PeriodKey, error: &GraphError) {
        tracing::warn!(period = %period, error = %error, "Skipping period");
        let path = match error {
            GraphError::MissingArtifact { what } => Some(PathBuf::from(what)),
            _ => None,
        };
        self.skipped.push(SkippedPeriod {
            period,
            reason: error.to_string(),
            path,
        });
    }

    /// Record a processed period.
    pub fn processed(&mut self, period: PeriodKey) {
        self.processed.push(period);
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.processed.extend(other.processed);
        self.skipped.extend(other.skipped);
        self.edges.merge(&other.edges);
        self.processed.sort();
        self.skipped.sort_by(|a, b| a.period.cmp(&b.period));
    }

    /// Number of skipped periods.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Whether every period was processed.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}
