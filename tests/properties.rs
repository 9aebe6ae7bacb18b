//! Property tests: closures against a brute-force reference, id ordering,
//! and rank normalization.

use proptest::prelude::*;
use registry_graph_kernel::{
    rank, Direction, Edge, EntityId, EntityIndex, PeriodInput, PeriodKey, PeriodRecordSet, RankPolicy,
    ReachabilitySolver, SchemaVariant, Snapshot,
};
use std::collections::BTreeSet;

const NODES: u32 = 8;
const PERIODS: [&str; 4] = ["2020-01", "2020-02", "2020-03", "2020-04"];

fn id(n: u32) -> EntityId {
    EntityId::new(n).unwrap()
}

/// Upper-triangular edge mask over `NODES` nodes, so every graph is acyclic.
fn dag(mask: &[bool]) -> Snapshot {
    let pairs = (1..=NODES).flat_map(|a| ((a + 1)..=NODES).map(move |b| (a, b)));
    let edges = pairs
        .zip(mask)
        .filter(|&(_, &on)| on)
        .map(|((a, b), _)| Edge::new(id(a), id(b)));
    Snapshot::from_edges(
        PeriodKey::parse("2020-01").unwrap(),
        NODES as usize,
        NODES as usize,
        edges,
    )
}

/// Every node at the end of some simple path from `seed` that avoids
/// `exclude`, by exhaustive path enumeration.
fn naive_closure(snapshot: &Snapshot, seed: EntityId, exclude: &BTreeSet<EntityId>) -> BTreeSet<EntityId> {
    fn walk(
        edges: &[Edge],
        at: EntityId,
        exclude: &BTreeSet<EntityId>,
        path: &mut Vec<EntityId>,
        out: &mut BTreeSet<EntityId>,
    ) {
        for edge in edges.iter().filter(|e| e.source == at) {
            let next = edge.target;
            if exclude.contains(&next) || path.contains(&next) {
                continue;
            }
            out.insert(next);
            path.push(next);
            walk(edges, next, exclude, path, out);
            path.pop();
        }
    }

    let edges: Vec<Edge> = snapshot.edges().collect();
    let mut out = BTreeSet::new();
    walk(&edges, seed, exclude, &mut vec![seed], &mut out);
    out
}

proptest! {
    #[test]
    fn closure_matches_path_enumeration(
        mask in prop::collection::vec(any::<bool>(), 28),
        seed in 1..=NODES,
        excluded in prop::collection::btree_set(1..=NODES, 0..3),
    ) {
        let snapshot = dag(&mask);
        let seed = id(seed);
        let exclude: BTreeSet<EntityId> = excluded.into_iter().map(id).collect();

        let closure = ReachabilitySolver::new().closure(&snapshot, seed, &exclude);
        let mut expected = naive_closure(&snapshot, seed, &exclude);
        expected.remove(&seed);

        prop_assert!(!closure.contains(seed));
        prop_assert!(exclude.iter().all(|e| !closure.contains(*e)));
        prop_assert_eq!(closure.members, expected);
    }

    #[test]
    fn dependents_match_transposed_closure(
        mask in prop::collection::vec(any::<bool>(), 28),
        seed in 1..=NODES,
    ) {
        let snapshot = dag(&mask);
        let none = BTreeSet::new();
        let solver = ReachabilitySolver::new();
        let dependents = solver.dependents(&snapshot, id(seed), &none);

        for other in 1..=NODES {
            let reaches = solver.closure(&snapshot, id(other), &none).contains(id(seed));
            prop_assert_eq!(dependents.contains(id(other)), reaches);
        }
    }

    #[test]
    fn rank_is_a_distribution(mask in prop::collection::vec(any::<bool>(), 28)) {
        let snapshot = dag(&mask);
        prop_assume!(snapshot.edge_count() > 0);

        for direction in Direction::ALL {
            let vector = rank(&snapshot, direction, &RankPolicy::default());
            prop_assert!(vector.scores.iter().all(|&s| s >= 0.0));
            prop_assert!((vector.total() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn ids_follow_first_seen_then_name(
        arrivals in prop::collection::btree_map("[a-z]{1,6}", 0usize..PERIODS.len(), 1..24),
    ) {
        let inputs: Vec<PeriodInput> = PERIODS
            .iter()
            .enumerate()
            .map(|(k, period)| {
                let period = PeriodKey::parse(period).unwrap();
                let mut set = PeriodRecordSet::new(period, "general".into(), Some(SchemaVariant::NameKeyed));
                for (name, _) in arrivals.iter().filter(|&(_, &at)| at <= k) {
                    set = set.with_entity(name, None);
                }
                PeriodInput::from_records(set)
            })
            .collect();
        let (index, _) = EntityIndex::build(&inputs);

        prop_assert_eq!(index.len(), arrivals.len());
        let mut expected: Vec<(usize, &str)> = arrivals.iter().map(|(n, &at)| (at, n.as_str())).collect();
        expected.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_bytes().cmp(b.1.as_bytes())));

        for (row, (at, name)) in expected.iter().enumerate() {
            let entity = index.entity(EntityId::from_index(row)).unwrap();
            prop_assert_eq!(entity.name.as_str(), *name);
            prop_assert_eq!(entity.first_seen.as_str(), PERIODS[*at]);
        }

        let ids: BTreeSet<EntityId> = index.entities().iter().map(|e| e.id).collect();
        prop_assert_eq!(ids.len(), index.len());
    }
}
