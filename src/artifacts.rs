//! Table writers and the run manifest.
//!
//! The bundler collects fingerprints of every derived artifact so a run can
//! be verified and replayed: two runs over identical inputs and policy share
//! a `run_id`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::canonical::{canonical_hash_hex, quantize};
use crate::centrality::{Direction, RankHistory};
use crate::cluster::{bucket_small_clusters, ClusterAssignment};
use crate::error::{BatchReport, GraphError};
use crate::index::EntityIndex;
use crate::layout::Layout;
use crate::policy::AnalysisPolicyV1;
use crate::store::SnapshotStore;
use crate::temporal::UnionGraph;
use crate::types::{EntityId, PeriodKey};
use crate::GRAPH_KERNEL_SCHEMA_VERSION;

// ─────────────────────────────────────────────────────────────────────────────
// CSV tables
// ─────────────────────────────────────────────────────────────────────────────

/// Write the union node table: `id, name, x, y, cluster, bucket`.
///
/// `id` is the compact union id and the layout must be computed over the
/// same union graph. `cluster` is empty for nodes that never appeared.
pub fn write_node_table<W: Write>(
    writer: W,
    index: &EntityIndex,
    union: &UnionGraph,
    layout: &Layout,
    clusters: &ClusterAssignment,
    min_cluster_size: usize,
) -> Result<(), GraphError> {
    let buckets = bucket_small_clusters(clusters, min_cluster_size);
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["id", "name", "x", "y", "cluster", "bucket"])?;

    for (row, &original) in union.nodes().iter().enumerate() {
        let compact = EntityId::from_index(row);
        let point = layout.get(compact).ok_or_else(|| GraphError::MissingArtifact {
            what: format!("layout position for union node {compact}"),
        })?;
        let cluster = clusters
            .cluster_of(original)
            .map(|c| c.to_string())
            .unwrap_or_default();
        let bucket = buckets
            .get(&original)
            .map(|b| b.to_string())
            .unwrap_or_default();
        let record: [&str; 6] = [
            &compact.to_string(),
            index.name(original)?,
            &format!("{:.6}", point.x),
            &format!("{:.6}", point.y),
            &cluster,
            &bucket,
        ];
        wtr.write_record(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the union edge table: `source_id, target_id` in compact ids.
pub fn write_edge_table<W: Write>(writer: W, union: &UnionGraph) -> Result<(), GraphError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["source_id", "target_id"])?;
    for edge in union.edges() {
        wtr.write_record([edge.source.to_string(), edge.target.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write one row per period: `period, name_1, score_1, ..., name_k, score_k`.
///
/// Empty slots are written as empty cells.
pub fn write_rank_top<W: Write>(writer: W, index: &EntityIndex, history: &RankHistory) -> Result<(), GraphError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["period".to_string()];
    for slot in 1..=history.k {
        header.push(format!("name_{slot}"));
        header.push(format!("score_{slot}"));
    }
    wtr.write_record(&header)?;

    for (period, slots) in &history.top {
        let mut record = vec![period.to_string()];
        for slot in slots {
            match slot {
                Some((id, score)) => {
                    record.push(index.name(*id)?.to_string());
                    record.push(format!("{score:.9}"));
                }
                None => {
                    record.push(String::new());
                    record.push(String::new());
                }
            }
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the dense history: `period, <tracked name>...`.
pub fn write_rank_table<W: Write>(writer: W, index: &EntityIndex, history: &RankHistory) -> Result<(), GraphError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["period".to_string()];
    for id in &history.tracked {
        header.push(index.name(*id)?.to_string());
    }
    wtr.write_record(&header)?;

    for (period, row) in &history.table {
        let mut record = vec![period.to_string()];
        record.extend(row.iter().map(|score| format!("{score:.9}")));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

/// File names of run artifacts, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Entity index document.
    pub index: String,
    /// Directory of `adj_<period>.smat` files.
    pub matrices_dir: String,
    /// Union node table.
    pub union_nodes: String,
    /// Union edge table.
    pub union_edges: String,
    /// Per-direction top-k tables, `{direction}` is substituted.
    pub rank_top: String,
    /// Per-direction dense tables, `{direction}` is substituted.
    pub rank_table: String,
    /// This manifest.
    pub manifest: String,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            index: "entity_index_v1.json".to_string(),
            matrices_dir: "matrices/".to_string(),
            union_nodes: "union_nodes_v1.csv".to_string(),
            union_edges: "union_edges_v1.csv".to_string(),
            rank_top: "rank_{direction}_top_v1.csv".to_string(),
            rank_table: "rank_{direction}_table_v1.csv".to_string(),
            manifest: "manifest_v1.json".to_string(),
        }
    }
}

impl ArtifactPaths {
    /// Top-k table name for one direction.
    pub fn rank_top_for(&self, direction: Direction) -> String {
        self.rank_top.replace("{direction}", &direction.to_string())
    }

    /// Dense table name for one direction.
    pub fn rank_table_for(&self, direction: Direction) -> String {
        self.rank_table.replace("{direction}", &direction.to_string())
    }
}

/// Summary statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Entities in the index.
    pub entity_count: usize,
    /// Materialized periods.
    pub period_count: usize,
    /// Edges summed over all periods.
    pub edge_count: usize,
    /// Periods skipped during the run.
    pub skipped_periods: usize,
    /// Dependency pairs dropped (unindexed or ambiguous).
    pub dropped_pairs: usize,
    /// Union graph nodes, when a temporal query ran.
    pub union_nodes: usize,
    /// Union graph edges, when a temporal query ran.
    pub union_edges: usize,
}

/// Fingerprints of every artifact of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Hash over every fingerprint below.
    pub run_id: String,
    /// Schema version.
    pub version: String,
    /// Entity index fingerprint.
    pub index_fingerprint: String,
    /// Fingerprint per period snapshot.
    pub snapshot_fingerprints: BTreeMap<String, String>,
    /// Union graph fingerprint, when a temporal query ran.
    #[serde(default)]
    pub union_fingerprint: Option<String>,
    /// Rank history hash per direction.
    #[serde(default)]
    pub rank_history_hashes: BTreeMap<Direction, String>,
    /// Analysis policy id.
    pub policy_id: String,
    /// Analysis policy parameter hash.
    pub policy_params_hash: String,
    /// Unix timestamp when computed.
    pub computed_at: i64,
    /// Paths to all artifacts.
    pub artifact_paths: ArtifactPaths,
    /// Summary statistics.
    pub stats: RunStats,
}

impl RunManifest {
    /// Write as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<(), GraphError> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Internal struct for computing run_id.
#[derive(Serialize)]
struct RunIdInput<'a> {
    version: &'a str,
    index_fingerprint: &'a str,
    snapshot_fingerprints: &'a BTreeMap<String, String>,
    union_fingerprint: &'a Option<String>,
    rank_history_hashes: &'a BTreeMap<Direction, String>,
    policy_params_hash: &'a str,
}

/// Rank history with scores quantized for hashing.
#[derive(Serialize)]
struct QuantizedRankHistory<'a> {
    direction: Direction,
    k: usize,
    top: BTreeMap<&'a PeriodKey, Vec<Option<(EntityId, i64)>>>,
    tracked: &'a [EntityId],
    table: BTreeMap<&'a PeriodKey, Vec<i64>>,
}

impl<'a> From<&'a RankHistory> for QuantizedRankHistory<'a> {
    fn from(history: &'a RankHistory) -> Self {
        Self {
            direction: history.direction,
            k: history.k,
            top: history
                .top
                .iter()
                .map(|(period, slots)| {
                    let slots = slots.iter().map(|s| s.map(|(id, score)| (id, quantize(score)))).collect();
                    (period, slots)
                })
                .collect(),
            tracked: &history.tracked,
            table: history
                .table
                .iter()
                .map(|(period, row)| (period, row.iter().map(|&s| quantize(s)).collect()))
                .collect(),
        }
    }
}

/// Builder for run manifests.
#[derive(Debug, Default)]
pub struct ArtifactBundler {
    index: Option<(String, usize)>,
    snapshots: Option<(BTreeMap<String, String>, usize)>,
    union: Option<(String, usize, usize)>,
    rank_histories: BTreeMap<Direction, String>,
    policy: Option<(String, String)>,
    report: Option<BatchReport>,
    artifact_paths: ArtifactPaths,
}

impl ArtifactBundler {
    /// Create a new bundler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom artifact paths.
    pub fn with_paths(mut self, paths: ArtifactPaths) -> Self {
        self.artifact_paths = paths;
        self
    }

    /// Record the entity index.
    pub fn index(mut self, index: &EntityIndex) -> Self {
        self.index = Some((index.fingerprint(), index.len()));
        self
    }

    /// Record the snapshot store.
    pub fn snapshots(mut self, store: &SnapshotStore) -> Self {
        let fingerprints = store
            .fingerprints()
            .into_iter()
            .map(|(period, hash)| (period.to_string(), hash))
            .collect();
        let edges = store.iter().map(|(_, s)| s.edge_count()).sum();
        self.snapshots = Some((fingerprints, edges));
        self
    }

    /// Record a union graph.
    pub fn union(mut self, union: &UnionGraph) -> Self {
        self.union = Some((union.fingerprint(), union.len(), union.edge_count()));
        self
    }

    /// Record a rank history.
    pub fn rank_history(mut self, history: &RankHistory) -> Self {
        self.rank_histories
            .insert(history.direction, canonical_hash_hex(&QuantizedRankHistory::from(history)));
        self
    }

    /// Record the analysis policy.
    pub fn policy(mut self, policy: &AnalysisPolicyV1) -> Self {
        self.policy = Some((policy.policy_id().to_string(), policy.params_hash()));
        self
    }

    /// Record batch outcomes. Reports are merged.
    pub fn report(mut self, report: &BatchReport) -> Self {
        match &mut self.report {
            Some(existing) => existing.merge(report.clone()),
            None => self.report = Some(report.clone()),
        }
        self
    }

    /// Build the manifest.
    ///
    /// Index, snapshots and policy are required.
    pub fn build(self) -> Result<RunManifest, GraphError> {
        let missing = |what: &str| GraphError::MissingArtifact {
            what: format!("{what} for run manifest"),
        };
        let (index_fingerprint, entity_count) = self.index.ok_or_else(|| missing("entity index"))?;
        let (snapshot_fingerprints, edge_count) = self.snapshots.ok_or_else(|| missing("snapshot store"))?;
        let (policy_id, policy_params_hash) = self.policy.ok_or_else(|| missing("analysis policy"))?;

        let union_fingerprint = self.union.as_ref().map(|(hash, _, _)| hash.clone());
        let run_id = canonical_hash_hex(&RunIdInput {
            version: GRAPH_KERNEL_SCHEMA_VERSION,
            index_fingerprint: &index_fingerprint,
            snapshot_fingerprints: &snapshot_fingerprints,
            union_fingerprint: &union_fingerprint,
            rank_history_hashes: &self.rank_histories,
            policy_params_hash: &policy_params_hash,
        });

        let report = self.report.unwrap_or_default();
        let (union_nodes, union_edges) = self.union.map(|(_, n, e)| (n, e)).unwrap_or((0, 0));
        let stats = RunStats {
            entity_count,
            period_count: snapshot_fingerprints.len(),
            edge_count,
            skipped_periods: report.skipped_count(),
            dropped_pairs: report.edges.dropped(),
            union_nodes,
            union_edges,
        };

        let computed_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        Ok(RunManifest {
            run_id,
            version: GRAPH_KERNEL_SCHEMA_VERSION.to_string(),
            index_fingerprint,
            snapshot_fingerprints,
            union_fingerprint,
            rank_history_hashes: self.rank_histories,
            policy_id,
            policy_params_hash,
            computed_at,
            artifact_paths: self.artifact_paths,
            stats,
        })
    }
}
