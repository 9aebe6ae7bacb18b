//! End-to-end tests for the temporal pipeline:
//! 1. Index and snapshot construction
//! 2. Closures per period, with and without exclusion
//! 3. Union graphs across periods
//! 4. Rank direction and normalization
//! 5. Artifact round-trips through a directory

use registry_graph_kernel::{
    rank, AnalysisPolicyV1, ArtifactBundler, Direction, Edge, EntityIndex, PeriodInput, PeriodKey,
    PeriodRecordSet, RankPolicy, ReachabilitySolver, SchemaVariant, Snapshot, SnapshotStore,
    SourceCatalog, SourcePrecedence, TemporalAggregator, TemporalQuery,
};
use std::collections::BTreeSet;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn p(s: &str) -> PeriodKey {
    PeriodKey::parse(s).unwrap()
}

fn records(period: &str, names: &[&str], deps: &[(&str, &str)]) -> PeriodRecordSet {
    let mut set = PeriodRecordSet::new(p(period), "general".into(), Some(SchemaVariant::NameKeyed));
    for name in names {
        set = set.with_entity(name, None);
    }
    for (from, to) in deps {
        set = set.with_dependency(from, to, "");
    }
    set
}

fn build(sets: Vec<PeriodRecordSet>) -> (EntityIndex, SnapshotStore) {
    let inputs: Vec<PeriodInput> = sets.into_iter().map(PeriodInput::from_records).collect();
    let (index, report) = EntityIndex::build(&inputs);
    assert!(report.is_clean());
    let (store, report) = SnapshotStore::build(&index, &inputs);
    assert!(report.is_clean());
    (index, store)
}

/// A→B, B→C in January; C→D added in February.
fn abcd() -> (EntityIndex, SnapshotStore) {
    build(vec![
        records("2020-01", &["A", "B", "C", "D"], &[("A", "B"), ("B", "C")]),
        records(
            "2020-02",
            &["A", "B", "C", "D"],
            &[("A", "B"), ("B", "C"), ("C", "D")],
        ),
    ])
}

fn names(index: &EntityIndex, ids: impl IntoIterator<Item = registry_graph_kernel::EntityId>) -> Vec<String> {
    ids.into_iter().map(|id| index.name(id).unwrap().to_string()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Closures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_closure_per_period() {
    let (index, store) = abcd();
    let solver = ReachabilitySolver::new();

    let jan: &Snapshot = store.get(&p("2020-01")).unwrap();
    let jan = solver.closure_by_name(&index, jan, "A", &[]).unwrap();
    assert_eq!(names(&index, jan.iter()), vec!["B", "C"]);

    let feb: &Snapshot = store.get(&p("2020-02")).unwrap();
    let feb = solver.closure_by_name(&index, feb, "A", &[]).unwrap();
    assert_eq!(names(&index, feb.iter()), vec!["B", "C", "D"]);
}

#[test]
fn test_exclusion_blocks_traversal() {
    let (index, store) = abcd();
    let feb: &Snapshot = store.get(&p("2020-02")).unwrap();
    let closure = ReachabilitySolver::new()
        .closure_by_name(&index, feb, "A", &["B"])
        .unwrap();
    assert!(closure.is_empty());
}

#[test]
fn test_unknown_seed_fails_closed() {
    let (index, store) = abcd();
    let feb: &Snapshot = store.get(&p("2020-02")).unwrap();
    assert!(ReachabilitySolver::new()
        .closure_by_name(&index, feb, "Nope", &[])
        .is_err());
    assert!(TemporalAggregator::new(&index, &store).run_by_name("Nope", &[]).is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Union graphs
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_union_over_two_periods() {
    let (index, store) = abcd();
    let result = TemporalAggregator::new(&index, &store).run_by_name("A", &[]).unwrap();

    assert_eq!(names(&index, result.union.nodes().iter().copied()), vec!["A", "B", "C", "D"]);
    let edges: Vec<(String, String)> = result
        .union
        .original_edges()
        .map(|e| (index.name(e.source).unwrap().to_string(), index.name(e.target).unwrap().to_string()))
        .collect();
    assert_eq!(
        edges,
        vec![
            ("A".to_string(), "B".to_string()),
            ("B".to_string(), "C".to_string()),
            ("C".to_string(), "D".to_string()),
        ]
    );
}

#[test]
fn test_union_keeps_edges_from_a_single_period() {
    let (index, store) = build(vec![
        records("2020-01", &["A", "B", "C"], &[("A", "B")]),
        records("2020-02", &["A", "B", "C"], &[("A", "B"), ("B", "C")]),
        records("2020-03", &["A", "B", "C"], &[("A", "B")]),
    ]);
    let result = TemporalAggregator::new(&index, &store).run_by_name("A", &[]).unwrap();

    let b = index.id("B").unwrap();
    let c = index.id("C").unwrap();
    assert_eq!(result.slices.len(), 3);
    assert!(result.union.original_edges().any(|e| e == Edge::new(b, c)));
    assert_eq!(result.union.len(), 3);

    // C only shows up in February's frame.
    let frames = result.frames();
    let c_compact = result.union.compact_id(c).unwrap();
    let with_c: Vec<&str> = frames
        .iter()
        .filter(|f| f.nodes.contains(&c_compact))
        .map(|f| f.period.as_str())
        .collect();
    assert_eq!(with_c, vec!["2020-02"]);
}

#[test]
fn test_query_range_and_clusters() {
    let (index, store) = abcd();
    let a = index.id("A").unwrap();
    let query = TemporalQuery::new(a).ending_at(p("2020-01"));
    let result = TemporalAggregator::new(&index, &store).run(&query).unwrap();

    assert_eq!(result.slices.len(), 1);
    assert_eq!(result.union.len(), 3);

    let full = TemporalAggregator::new(&index, &store).run_by_name("A", &[]).unwrap();
    let clusters = full.clusters();
    assert_eq!(clusters.len(), 2);
    assert_eq!(clusters.cluster_of(index.id("D").unwrap()), Some(1));
    assert_eq!(clusters.period_of(1), Some(&p("2020-02")));
}

// ─────────────────────────────────────────────────────────────────────────────
// Rank
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_rank_directions_on_xyz() {
    let (index, store) = build(vec![records(
        "2020-01",
        &["X", "Y", "Z"],
        &[("X", "Y"), ("X", "Z"), ("Y", "Z")],
    )]);
    let snapshot = store.get(&p("2020-01")).unwrap();
    let policy = RankPolicy::default();

    let forward = rank(snapshot, Direction::Forward, &policy);
    let backward = rank(snapshot, Direction::Backward, &policy);

    let top_forward = forward.top_k(1)[0].unwrap().0;
    let top_backward = backward.top_k(1)[0].unwrap().0;
    assert_eq!(index.name(top_forward).unwrap(), "X");
    assert_eq!(index.name(top_backward).unwrap(), "Z");

    for vector in [&forward, &backward] {
        assert!(vector.scores.iter().all(|&s| s >= 0.0));
        assert!((vector.total() - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_backward_equals_forward_on_transpose() {
    let id = |n: u32| registry_graph_kernel::EntityId::new(n).unwrap();
    let snapshot = Snapshot::from_edges(
        p("2020-01"),
        5,
        5,
        [(1, 2), (1, 3), (2, 3), (3, 4), (4, 5), (5, 3), (2, 5)]
            .into_iter()
            .map(|(a, b)| Edge::new(id(a), id(b))),
    );
    let policy = RankPolicy::default();

    let backward = rank(&snapshot, Direction::Backward, &policy);
    let forward_t = rank(&snapshot.transpose(), Direction::Forward, &policy);
    for (a, b) in backward.scores.iter().zip(&forward_t.scores) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }
}

#[test]
fn test_empty_period_ranks_all_zero() {
    let (_, store) = build(vec![records("2020-01", &["A", "B"], &[])]);
    let vector = rank(store.get(&p("2020-01")).unwrap(), Direction::Forward, &RankPolicy::default());
    assert_eq!(vector.total(), 0.0);
    assert!(vector.top_k(2).iter().all(Option::is_none));
}

// ─────────────────────────────────────────────────────────────────────────────
// Artifacts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_pipeline_from_directory_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let records_dir = dir.path().join("records");
    let sets = [
        ("metadata", records("2020-01", &["A", "B", "C"], &[("A", "B")])),
        ("metadata", records("2020-02", &["A", "B", "C"], &[("A", "C")])),
        ("general", records("2020-02", &["A", "B", "C"], &[("A", "B"), ("B", "C")])),
    ];
    for (source, set) in &sets {
        let source_dir = records_dir.join(source);
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::write(
            source_dir.join(format!("{}.json", set.period)),
            serde_json::to_vec(set).unwrap(),
        )
        .unwrap();
    }

    let catalog = SourceCatalog::scan_dir(&records_dir).unwrap();
    let inputs = catalog.select(&SourcePrecedence::with_default_sources(p("2020-02")));
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[1].source.as_str(), "general");

    let (index, _) = EntityIndex::build(&inputs);
    let (store, report) = SnapshotStore::build(&index, &inputs);
    assert!(report.is_clean());

    let index_path = dir.path().join("entity_index_v1.json");
    let matrices = dir.path().join("matrices");
    index.save(&index_path).unwrap();
    assert_eq!(store.write_dir(&matrices).unwrap(), 2);

    let loaded_index = EntityIndex::load(&index_path).unwrap();
    let (loaded_store, report) = SnapshotStore::read_dir(&matrices, &loaded_index).unwrap();
    assert!(report.is_clean());
    assert_eq!(loaded_index.fingerprint(), index.fingerprint());
    assert_eq!(loaded_store.fingerprints(), store.fingerprints());

    let before = TemporalAggregator::new(&index, &store).run_by_name("A", &[]).unwrap();
    let after = TemporalAggregator::new(&loaded_index, &loaded_store).run_by_name("A", &[]).unwrap();
    assert_eq!(before.union, after.union);

    let policy = AnalysisPolicyV1::default();
    let manifest = |index: &EntityIndex, store: &SnapshotStore| {
        ArtifactBundler::new()
            .index(index)
            .snapshots(store)
            .union(&before.union)
            .policy(&policy)
            .build()
            .unwrap()
    };
    assert_eq!(manifest(&index, &store).run_id, manifest(&loaded_index, &loaded_store).run_id);
}

#[test]
fn test_excluded_ids_in_no_slice() {
    let (index, store) = abcd();
    let query = TemporalQuery::by_name(&index, "A", &["C"]).unwrap();
    let result = TemporalAggregator::new(&index, &store).run(&query).unwrap();
    let c = index.id("C").unwrap();

    for slice in result.slices.values() {
        assert!(!slice.closure.contains(c));
        assert!(!slice.closure.contains(query.seed));
    }
    let expected: BTreeSet<_> = [index.id("A").unwrap(), index.id("B").unwrap()].into();
    assert_eq!(result.union.nodes().iter().copied().collect::<BTreeSet<_>>(), expected);
}
