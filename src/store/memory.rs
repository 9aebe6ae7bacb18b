//! In-memory snapshot store keyed by period.
//!
//! Uses BTreeMap for deterministic iteration order. Snapshots are shared
//! behind `Arc` so per-period workers can hold them without copying.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use super::builder::{EdgeStats, SnapshotBuilder};
use super::smat;
use super::snapshot::Snapshot;
use crate::catalog::PeriodInput;
use crate::error::{BatchReport, GraphError};
use crate::index::EntityIndex;
use crate::types::PeriodKey;

/// All materialized snapshots over one index.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    dim: usize,
    snapshots: BTreeMap<PeriodKey, Arc<Snapshot>>,
    edge_stats: BTreeMap<PeriodKey, EdgeStats>,
}

impl SnapshotStore {
    /// Create an empty store for an index of size `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// Materialize every input against `index`, one period per task.
    ///
    /// A period that fails to load is skipped and reported.
    pub fn build(index: &EntityIndex, inputs: &[PeriodInput]) -> (Self, BatchReport) {
        let builder = SnapshotBuilder::new(index);
        let results: Vec<(PeriodKey, Result<(Snapshot, EdgeStats), GraphError>)> = inputs
            .par_iter()
            .map(|input| {
                let built = input.load().map(|records| builder.build(&records));
                (input.period.clone(), built)
            })
            .collect();

        let mut store = Self::new(index.len());
        let mut report = BatchReport::new();
        for (period, result) in results {
            match result {
                Ok((snapshot, stats)) => {
                    report.edges.merge(&stats);
                    store.edge_stats.insert(period.clone(), stats);
                    store.snapshots.insert(period.clone(), Arc::new(snapshot));
                    report.processed(period);
                }
                Err(e) => report.skip(period, &e),
            }
        }
        report.processed.sort();
        report.skipped.sort_by(|a, b| a.period.cmp(&b.period));

        tracing::info!(
            periods = store.len(),
            skipped = report.skipped_count(),
            edges = report.edges.emitted,
            dropped = report.edges.dropped(),
            ambiguous = report.edges.ambiguous,
            "Materialized snapshots"
        );
        (store, report)
    }

    /// Add or replace a snapshot.
    pub fn insert(&mut self, snapshot: Snapshot) -> Result<(), GraphError> {
        if snapshot.dim() != self.dim {
            return Err(GraphError::CorruptArtifact {
                what: format!("snapshot for period {}", snapshot.period()),
                reason: format!("dimension {} does not match index size {}", snapshot.dim(), self.dim),
            });
        }
        self.snapshots
            .insert(snapshot.period().clone(), Arc::new(snapshot));
        Ok(())
    }

    /// Global index size every snapshot is sized to.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the store holds no period.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshot for one period.
    pub fn get(&self, period: &PeriodKey) -> Result<&Arc<Snapshot>, GraphError> {
        self.snapshots
            .get(period)
            .ok_or_else(|| GraphError::missing_period(period))
    }

    /// Periods, chronologically.
    pub fn periods(&self) -> impl Iterator<Item = &PeriodKey> {
        self.snapshots.keys()
    }

    /// All snapshots, chronologically.
    pub fn iter(&self) -> impl Iterator<Item = (&PeriodKey, &Arc<Snapshot>)> {
        self.snapshots.iter()
    }

    /// Contiguous sub-range, both bounds inclusive and optional.
    ///
    /// An inverted range yields nothing.
    pub fn range<'a>(
        &'a self,
        start: Option<&'a PeriodKey>,
        end: Option<&'a PeriodKey>,
    ) -> impl Iterator<Item = (&'a PeriodKey, &'a Arc<Snapshot>)> + 'a {
        self.snapshots.iter().filter(move |(period, _)| {
            start.map_or(true, |s| *period >= s) && end.map_or(true, |e| *period <= e)
        })
    }

    /// Edge counters recorded when each period was built.
    pub fn edge_stats(&self) -> &BTreeMap<PeriodKey, EdgeStats> {
        &self.edge_stats
    }

    /// Fingerprint of every snapshot.
    pub fn fingerprints(&self) -> BTreeMap<PeriodKey, String> {
        self.snapshots
            .iter()
            .map(|(period, snapshot)| (period.clone(), snapshot.fingerprint()))
            .collect()
    }

    /// Write every snapshot as `dir/adj_<period>.smat`.
    pub fn write_dir(&self, dir: &Path) -> Result<usize, GraphError> {
        std::fs::create_dir_all(dir)?;
        for snapshot in self.snapshots.values() {
            smat::write_smat_file(snapshot, dir)?;
        }
        tracing::info!(dir = %dir.display(), periods = self.len(), "Wrote adjacency artifacts");
        Ok(self.len())
    }

    /// Read every `adj_<period>.smat` in `dir` against `index`.
    ///
    /// Unreadable or mis-sized files are skipped and reported.
    pub fn read_dir(dir: &Path, index: &EntityIndex) -> Result<(Self, BatchReport), GraphError> {
        if !dir.is_dir() {
            return Err(GraphError::missing_path(dir));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if let Some(period) = smat::period_from_file_name(name) {
                files.push((period, path));
            }
        }
        files.sort();

        let results: Vec<(PeriodKey, Result<Snapshot, GraphError>)> = files
            .par_iter()
            .map(|(period, path)| {
                let read = std::fs::File::open(path)
                    .map_err(GraphError::from)
                    .and_then(|file| {
                        smat::read_smat(
                            period.clone(),
                            index.len(),
                            index.populated_at(period),
                            BufReader::new(file),
                            &path.display().to_string(),
                        )
                    });
                (period.clone(), read)
            })
            .collect();

        let mut store = Self::new(index.len());
        let mut report = BatchReport::new();
        for (period, result) in results {
            match result.and_then(|snapshot| store.insert(snapshot)) {
                Ok(()) => report.processed(period),
                Err(e) => report.skip(period, &e),
            }
        }
        tracing::info!(
            dir = %dir.display(),
            periods = store.len(),
            skipped = report.skipped_count(),
            "Read adjacency artifacts"
        );
        Ok((store, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PeriodRecordSet, SchemaVariant};

    fn p(s: &str) -> PeriodKey {
        PeriodKey::parse(s).unwrap()
    }

    fn inputs() -> Vec<PeriodInput> {
        let jan = PeriodRecordSet::new(p("2020-01"), "general".into(), Some(SchemaVariant::NameKeyed))
            .with_entity("A", None)
            .with_entity("B", None)
            .with_dependency("A", "B", "u-b");
        let feb = PeriodRecordSet::new(p("2020-02"), "general".into(), Some(SchemaVariant::NameKeyed))
            .with_entity("A", None)
            .with_entity("B", None)
            .with_entity("C", None)
            .with_dependency("B", "C", "u-c");
        let mar = PeriodRecordSet::new(p("2020-03"), "general".into(), Some(SchemaVariant::NameKeyed))
            .with_entity("A", None);
        vec![
            PeriodInput::from_records(jan),
            PeriodInput::from_records(feb),
            PeriodInput::from_records(mar),
        ]
    }

    #[test]
    fn test_build_and_lookup() {
        let inputs = inputs();
        let (index, _) = EntityIndex::build(&inputs);
        let (store, report) = SnapshotStore::build(&index, &inputs);

        assert!(report.is_clean());
        assert_eq!(store.len(), 3);
        assert_eq!(report.edges.emitted, 2);
        assert_eq!(store.get(&p("2020-01")).unwrap().edge_count(), 1);
        assert!(matches!(
            store.get(&p("2021-01")),
            Err(GraphError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn test_range_inclusive_and_inverted() {
        let inputs = inputs();
        let (index, _) = EntityIndex::build(&inputs);
        let (store, _) = SnapshotStore::build(&index, &inputs);

        let (lo, hi) = (p("2020-02"), p("2020-03"));
        let mid: Vec<&str> = store
            .range(Some(&lo), Some(&hi))
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(mid, vec!["2020-02", "2020-03"]);
        assert_eq!(store.range(None, Some(&p("2020-01"))).count(), 1);
        assert_eq!(store.range(Some(&p("2020-03")), Some(&p("2020-01"))).count(), 0);
    }

    #[test]
    fn test_dir_roundtrip() {
        let inputs = inputs();
        let (index, _) = EntityIndex::build(&inputs);
        let (store, _) = SnapshotStore::build(&index, &inputs);

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store.write_dir(dir.path()).unwrap(), 3);
        std::fs::write(dir.path().join("adj_2020-04.smat"), "9 9 0\n").unwrap();

        let (back, report) = SnapshotStore::read_dir(dir.path(), &index).unwrap();
        assert_eq!(back.fingerprints(), store.fingerprints());
        assert_eq!(report.skipped_count(), 1);
    }

    #[test]
    fn test_oversized_header_skips_only_its_period() {
        let inputs = inputs();
        let (index, _) = EntityIndex::build(&inputs);
        let (store, _) = SnapshotStore::build(&index, &inputs);
        let jan: &Snapshot = store.get(&p("2020-01")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        smat::write_smat_file(jan, dir.path()).unwrap();
        std::fs::write(dir.path().join("adj_2020-02.smat"), "2 2 18446744073709551615\n").unwrap();

        let (back, report) = SnapshotStore::read_dir(dir.path(), &index).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.get(&p("2020-01")).unwrap().fingerprint(), jan.fingerprint());
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.skipped[0].period, p("2020-02"));
    }
}
