//! Per-period candidate sources and precedence-based selection.
//!
//! A catalog knows, for every period, which raw sources have canonical
//! record sets. [`SourceCatalog::select`] applies a [`SourcePrecedence`] to
//! pick exactly one input per period. Loading is deferred so one unreadable
//! period never prevents the others from being selected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::GraphError;
use crate::policy::SourcePrecedence;
use crate::types::{PeriodKey, PeriodRecordSet, SourceTag};

/// Where a period's records live.
#[derive(Debug, Clone)]
pub enum RecordOrigin {
    /// Canonical JSON file on disk.
    File(PathBuf),
    /// Already-parsed records.
    Inline(Arc<PeriodRecordSet>),
}

/// One selected period, ready to load.
#[derive(Debug, Clone)]
pub struct PeriodInput {
    /// Period.
    pub period: PeriodKey,
    /// Source chosen for this period.
    pub source: SourceTag,
    /// True when the preferred source was missing.
    pub fallback: bool,
    origin: RecordOrigin,
}

impl PeriodInput {
    /// Wrap in-memory records.
    pub fn from_records(records: PeriodRecordSet) -> Self {
        Self {
            period: records.period.clone(),
            source: records.source.clone(),
            fallback: false,
            origin: RecordOrigin::Inline(Arc::new(records)),
        }
    }

    /// Point at a canonical JSON file.
    pub fn from_file(period: PeriodKey, source: SourceTag, path: impl Into<PathBuf>) -> Self {
        Self {
            period,
            source,
            fallback: false,
            origin: RecordOrigin::File(path.into()),
        }
    }

    /// Where the records come from.
    pub fn origin(&self) -> &RecordOrigin {
        &self.origin
    }

    /// Load and validate the record set.
    pub fn load(&self) -> Result<Arc<PeriodRecordSet>, GraphError> {
        match &self.origin {
            RecordOrigin::Inline(records) => {
                records.validate()?;
                Ok(Arc::clone(records))
            }
            RecordOrigin::File(path) => {
                let bytes = read_artifact(path)?;
                PeriodRecordSet::from_json_slice(&self.period, &bytes).map(Arc::new)
            }
        }
    }
}

/// Read a file, mapping "not found" to [`GraphError::MissingArtifact`].
pub(crate) fn read_artifact(path: &Path) -> Result<Vec<u8>, GraphError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => GraphError::missing_path(path),
        _ => GraphError::Io(e),
    })
}

/// Candidate sources per period.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    candidates: BTreeMap<PeriodKey, BTreeMap<SourceTag, RecordOrigin>>,
}

impl SourceCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register in-memory records. A later insert for the same
    /// `(period, source)` replaces the earlier one.
    pub fn insert_records(&mut self, records: PeriodRecordSet) {
        self.candidates
            .entry(records.period.clone())
            .or_default()
            .insert(records.source.clone(), RecordOrigin::Inline(Arc::new(records)));
    }

    /// Register a record file.
    pub fn insert_file(&mut self, period: PeriodKey, source: SourceTag, path: impl Into<PathBuf>) {
        self.candidates
            .entry(period)
            .or_default()
            .insert(source, RecordOrigin::File(path.into()));
    }

    /// Scan `root/<source>/<period>.json`.
    ///
    /// Files whose stem is not a period key are ignored.
    pub fn scan_dir(root: &Path) -> Result<Self, GraphError> {
        if !root.is_dir() {
            return Err(GraphError::missing_path(root));
        }
        let mut catalog = Self::new();
        for source_dir in std::fs::read_dir(root)? {
            let source_dir = source_dir?.path();
            if !source_dir.is_dir() {
                continue;
            }
            let Some(tag) = source_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let source = SourceTag::new(tag);
            for file in std::fs::read_dir(&source_dir)? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                match PeriodKey::parse(stem) {
                    Ok(period) => catalog.insert_file(period, source.clone(), path),
                    Err(_) => tracing::debug!(path = %path.display(), "Ignoring non-period file"),
                }
            }
        }
        tracing::info!(
            root = %root.display(),
            periods = catalog.len(),
            "Scanned record catalog"
        );
        Ok(catalog)
    }

    /// Number of periods with at least one source.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// All periods, chronologically.
    pub fn periods(&self) -> impl Iterator<Item = &PeriodKey> {
        self.candidates.keys()
    }

    /// Sources available for one period.
    pub fn sources_for(&self, period: &PeriodKey) -> Vec<&SourceTag> {
        self.candidates
            .get(period)
            .map(|sources| sources.keys().collect())
            .unwrap_or_default()
    }

    /// Pick one input per period, chronologically ordered.
    pub fn select(&self, precedence: &SourcePrecedence) -> Vec<PeriodInput> {
        let mut selected = Vec::with_capacity(self.candidates.len());
        let mut fallbacks = 0usize;
        for (period, sources) in &self.candidates {
            let Some(choice) = precedence.select(period, sources.keys()) else {
                continue;
            };
            let Some(origin) = sources.get(&choice.source) else {
                continue;
            };
            if choice.fallback {
                fallbacks += 1;
                tracing::debug!(
                    period = %period,
                    preferred = %precedence.preferred(period),
                    chosen = %choice.source,
                    "Preferred source missing, falling back"
                );
            }
            selected.push(PeriodInput {
                period: period.clone(),
                source: choice.source,
                fallback: choice.fallback,
                origin: origin.clone(),
            });
        }
        tracing::info!(periods = selected.len(), fallbacks, "Selected period sources");
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SchemaVariant;

    fn p(s: &str) -> PeriodKey {
        PeriodKey::parse(s).unwrap()
    }

    fn records(period: &str, source: &str) -> PeriodRecordSet {
        PeriodRecordSet::new(p(period), source.into(), Some(SchemaVariant::NameKeyed))
            .with_entity(source, None)
    }

    #[test]
    fn test_select_applies_precedence_with_fallback() {
        let mut catalog = SourceCatalog::new();
        catalog.insert_records(records("2018-01", "metadata"));
        catalog.insert_records(records("2018-01", "general"));
        catalog.insert_records(records("2018-06", "metadata"));
        catalog.insert_records(records("2018-06", "general"));
        catalog.insert_records(records("2018-09", "metadata"));

        let precedence = SourcePrecedence::with_default_sources(p("2018-03"));
        let selected = catalog.select(&precedence);

        let chosen: Vec<(&str, &str, bool)> = selected
            .iter()
            .map(|s| (s.period.as_str(), s.source.as_str(), s.fallback))
            .collect();
        assert_eq!(
            chosen,
            vec![
                ("2018-01", "metadata", false),
                ("2018-06", "general", false),
                ("2018-09", "metadata", true),
            ]
        );
        assert_eq!(selected[2].load().unwrap().entities[0].name, "metadata");
    }

    #[test]
    fn test_scan_dir_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let general = dir.path().join("general");
        std::fs::create_dir_all(&general).unwrap();
        let good = records("2020-01", "general");
        std::fs::write(general.join("2020-01.json"), serde_json::to_vec(&good).unwrap()).unwrap();
        std::fs::write(general.join("2020-02.json"), b"not json").unwrap();
        std::fs::write(general.join("README.json"), b"{}").unwrap();

        let catalog = SourceCatalog::scan_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);

        let precedence = SourcePrecedence::with_default_sources(p("2019-01"));
        let selected = catalog.select(&precedence);
        assert_eq!(*selected[0].load().unwrap(), good);
        assert!(matches!(
            selected[1].load(),
            Err(GraphError::MalformedPeriodRecord { .. })
        ));

        let gone = PeriodInput::from_file(p("2020-03"), "general".into(), general.join("2020-03.json"));
        assert!(matches!(gone.load(), Err(GraphError::MissingArtifact { .. })));
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceCatalog::scan_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, GraphError::MissingArtifact { .. }));
    }
}
