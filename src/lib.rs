//! # registry-graph-kernel
//!
//! Temporal dependency graphs over dated package-registry snapshots.
//!
//! The kernel answers one question per period:
//!
//! > Given an entity, which other entities does it (transitively) depend on,
//! > and how important is each entity in that period's graph?
//!
//! ## Core Contract
//!
//! 1. Assign every entity one stable id, ordered by first appearance
//! 2. Materialize one sparse adjacency snapshot per period, over the same id space
//! 3. Answer closure, rank and union queries over any range of periods
//! 4. Fingerprint every derived artifact for downstream provenance
//!
//! ## Architecture
//!
//! ```text
//! SourceCatalog → PeriodInput → EntityIndex → SnapshotStore
//!                                                  ↓
//!              ReachabilitySolver / rank / TemporalAggregator
//!                                                  ↓
//!                   UnionGraph → Layout + ClusterAssignment → tables
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same inputs + same policy → identical index, snapshots and `run_id`
//! - Ids follow (first-seen period, name bytes)
//! - Edge and node ordering is canonical (ascending id)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifacts;
pub mod canonical;
pub mod catalog;
pub mod centrality;
pub mod cluster;
pub mod config;
pub mod error;
pub mod index;
pub mod layout;
pub mod logging;
pub mod policy;
pub mod reach;
pub mod store;
pub mod temporal;
pub mod types;

// Re-exports
pub use artifacts::{
    write_edge_table, write_node_table, write_rank_table, write_rank_top, ArtifactBundler,
    ArtifactPaths, RunManifest, RunStats,
};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use catalog::{PeriodInput, SourceCatalog};
pub use centrality::{rank, rank_graph, top_k, Direction, RankHistory, RankPolicy, RankVector};
pub use cluster::{bucket_small_clusters, cluster_by_first_appearance, ClusterAssignment, PresentationBucket};
pub use config::RunConfig;
pub use error::{BatchReport, GraphError, SkippedPeriod};
pub use index::{EntityIndex, EntityIndexBuilder, EntityIndexDocument, IndexedEntity};
pub use layout::{compute_layout, Layout, LayoutConfig, Point};
pub use logging::{init_tracing, LogFormat};
pub use policy::{AnalysisPolicyV1, SourcePrecedence, SourceSelection};
pub use reach::{DependencyClosure, ReachabilitySolver};
pub use store::{EdgeStats, Snapshot, SnapshotBuilder, SnapshotStore, SuccessorGraph};
pub use temporal::{Frame, PeriodSlice, TemporalAggregator, TemporalQuery, TemporalResult, UnionGraph};
pub use types::{
    DependencyPair, Edge, EntityId, EntityRecord, PeriodKey, PeriodRecordSet, SchemaVariant, SourceTag,
};

/// Schema version for persisted documents and manifests.
pub const GRAPH_KERNEL_SCHEMA_VERSION: &str = "1.0.0";

/// Default analysis policy version.
pub const DEFAULT_POLICY_VERSION: &str = "analysis_policy_v1";
