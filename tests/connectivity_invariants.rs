//! Property-based invariant tests for the connectivity store.
//!
//! Arbitrary interleavings of the store's mutating operations must preserve
//! the structural invariants: permanences stay in [0.0, 1.0], no segment
//! holds two synapses onto the same presynaptic cell, fan-out bounds hold,
//! activity flags stay coherent, and cleanup is idempotent.
//!
//! Run with: `cargo test --test connectivity_invariants`

use proptest::prelude::*;
use std::collections::HashSet;
use veles::prelude::*;

const NUM_COLUMNS: usize = 8;
const CELLS_PER_COLUMN: usize = 4;
const NUM_CELLS: usize = NUM_COLUMNS * CELLS_PER_COLUMN;
const SEGMENTS_PER_CELL: usize = 4;
const SYNAPSES_PER_SEGMENT: usize = 4;

const CONNECTED: f32 = 0.5;
const ACTIVE_THRESHOLD: usize = 2;
const MATCH_THRESHOLD: usize = 1;

#[derive(Debug, Clone)]
enum Op {
    CreateSegment { cell: usize },
    CreateSynapse { cell: usize, seg: usize, target: u32, perm: f32 },
    Adapt { cell: usize, seg: usize, actives: Vec<usize>, inc: f32, dec: f32 },
    Punish { cell: usize, seg: usize, actives: Vec<usize>, penalty: f32 },
    Grow { cell: usize, seg: usize, winners: Vec<usize>, max_new: usize },
    Activity { actives: Vec<usize> },
    Cleanup,
    Clear,
}

fn active_set() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(0..NUM_CELLS, 0..12)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NUM_CELLS).prop_map(|cell| Op::CreateSegment { cell }),
        (0..NUM_CELLS, 0..8usize, 0..NUM_CELLS as u32, -0.5f32..1.5)
            .prop_map(|(cell, seg, target, perm)| Op::CreateSynapse { cell, seg, target, perm }),
        (0..NUM_CELLS, 0..8usize, active_set(), 0.0f32..0.3, 0.0f32..0.3)
            .prop_map(|(cell, seg, actives, inc, dec)| Op::Adapt { cell, seg, actives, inc, dec }),
        (0..NUM_CELLS, 0..8usize, active_set(), 0.0f32..0.3)
            .prop_map(|(cell, seg, actives, penalty)| Op::Punish { cell, seg, actives, penalty }),
        (0..NUM_CELLS, 0..8usize, active_set(), 0..8usize)
            .prop_map(|(cell, seg, winners, max_new)| Op::Grow { cell, seg, winners, max_new }),
        active_set().prop_map(|actives| Op::Activity { actives }),
        Just(Op::Cleanup),
        Just(Op::Clear),
    ]
}

fn store() -> Connections {
    Connections::new(ConnectionsParams {
        num_columns: NUM_COLUMNS,
        cells_per_column: CELLS_PER_COLUMN,
        segments_per_cell: SEGMENTS_PER_CELL,
        synapses_per_segment: SYNAPSES_PER_SEGMENT,
    })
    .unwrap()
}

fn bitset(indices: &[usize]) -> Bitset {
    let mut bits = Bitset::new(NUM_CELLS);
    for &i in indices {
        bits.set(i);
    }
    bits
}

/// Resolves a raw segment choice onto an existing segment, if any.
fn pick_segment(conn: &Connections, cell: usize, raw: usize) -> Option<usize> {
    let len = conn.segments_for_cell(cell).len();
    if len == 0 {
        None
    } else {
        Some(raw % len)
    }
}

fn apply(conn: &mut Connections, rng: &mut Random, op: &Op) {
    match op {
        Op::CreateSegment { cell } => {
            conn.create_segment(*cell);
        }
        Op::CreateSynapse { cell, seg, target, perm } => {
            if let Some(seg) = pick_segment(conn, *cell, *seg) {
                conn.create_synapse(*cell, seg, *target, *perm);
            }
        }
        Op::Adapt { cell, seg, actives, inc, dec } => {
            if let Some(seg) = pick_segment(conn, *cell, *seg) {
                conn.adapt_segment(*cell, seg, &bitset(actives), *inc, *dec);
            }
        }
        Op::Punish { cell, seg, actives, penalty } => {
            if let Some(seg) = pick_segment(conn, *cell, *seg) {
                conn.punish_segment(*cell, seg, &bitset(actives), *penalty);
            }
        }
        Op::Grow { cell, seg, winners, max_new } => {
            if let Some(seg) = pick_segment(conn, *cell, *seg) {
                conn.grow_synapses(*cell, seg, &bitset(winners), 0.21, *max_new, rng);
            }
        }
        Op::Activity { actives } => {
            conn.clear();
            conn.compute_activity(&bitset(actives), CONNECTED, ACTIVE_THRESHOLD, MATCH_THRESHOLD);
        }
        Op::Cleanup => conn.cleanup(),
        Op::Clear => conn.clear(),
    }
}

fn assert_structural_invariants(conn: &Connections) {
    for cell in conn.cells() {
        assert!(cell.segments.len() <= SEGMENTS_PER_CELL, "segment fan-out exceeded");

        for seg in &cell.segments {
            assert!(seg.synapses.len() <= SYNAPSES_PER_SEGMENT, "synapse fan-out exceeded");

            let mut targets = HashSet::new();
            for syn in &seg.synapses {
                assert!(
                    (MIN_PERMANENCE..=MAX_PERMANENCE).contains(&syn.permanence),
                    "permanence {} out of bounds",
                    syn.permanence
                );
                assert!(
                    targets.insert(syn.presynaptic_cell),
                    "duplicate synapse onto cell {}",
                    syn.presynaptic_cell
                );
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_structural_invariants_hold(
        ops in proptest::collection::vec(op_strategy(), 1..120)
    ) {
        let mut conn = store();
        let mut rng = Random::new(99);

        for op in &ops {
            apply(&mut conn, &mut rng, op);
            assert_structural_invariants(&conn);
        }
    }

    #[test]
    fn prop_active_implies_matching(
        ops in proptest::collection::vec(op_strategy(), 1..60),
        actives in active_set()
    ) {
        let mut conn = store();
        let mut rng = Random::new(7);

        for op in &ops {
            apply(&mut conn, &mut rng, op);
        }

        conn.clear();
        conn.compute_activity(&bitset(&actives), CONNECTED, ACTIVE_THRESHOLD, MATCH_THRESHOLD);

        for cell in conn.cells() {
            for seg in &cell.segments {
                prop_assert!(!seg.active || seg.matching);
            }
        }
    }

    #[test]
    fn prop_cell_counters_match_flags(
        ops in proptest::collection::vec(op_strategy(), 1..60),
        actives in active_set()
    ) {
        let mut conn = store();
        let mut rng = Random::new(13);

        for op in &ops {
            apply(&mut conn, &mut rng, op);
        }

        conn.clear();
        conn.compute_activity(&bitset(&actives), CONNECTED, ACTIVE_THRESHOLD, MATCH_THRESHOLD);
        // Cleanup removes segments; the counters must follow the flags.
        conn.cleanup();

        for cell in conn.cells() {
            let active = cell.segments.iter().filter(|s| s.active).count();
            let matching = cell.segments.iter().filter(|s| s.matching).count();
            prop_assert_eq!(cell.num_active_segments, active);
            prop_assert_eq!(cell.num_matching_segments, matching);
        }
    }

    #[test]
    fn prop_cleanup_is_idempotent(
        ops in proptest::collection::vec(op_strategy(), 1..120)
    ) {
        let mut conn = store();
        let mut rng = Random::new(21);

        for op in &ops {
            apply(&mut conn, &mut rng, op);
        }

        conn.cleanup();
        let once = conn.clone();
        conn.cleanup();

        prop_assert_eq!(conn.cells(), once.cells());
        prop_assert_eq!(conn.compute_stats(), once.compute_stats());
    }

    #[test]
    fn prop_cleanup_removes_all_decayed_state(
        ops in proptest::collection::vec(op_strategy(), 1..120)
    ) {
        let mut conn = store();
        let mut rng = Random::new(33);

        for op in &ops {
            apply(&mut conn, &mut rng, op);
        }

        conn.cleanup();

        for cell in conn.cells() {
            for seg in &cell.segments {
                prop_assert!(!seg.synapses.is_empty(), "empty segment survived cleanup");
                for syn in &seg.synapses {
                    prop_assert!(syn.permanence >= SYNAPSE_PRUNE_EPSILON);
                }
            }
        }
    }

    #[test]
    fn prop_predicted_columns_are_consistent(
        ops in proptest::collection::vec(op_strategy(), 1..60),
        actives in active_set()
    ) {
        let mut conn = store();
        let mut rng = Random::new(55);

        for op in &ops {
            apply(&mut conn, &mut rng, op);
        }

        conn.clear();
        conn.compute_activity(&bitset(&actives), CONNECTED, ACTIVE_THRESHOLD, MATCH_THRESHOLD);

        let predicted = conn.predicted_columns();
        for col in 0..NUM_COLUMNS {
            let expected = conn
                .cells_for_column(col)
                .any(|c| conn.active_segments_for_cell(c) > 0);
            prop_assert_eq!(predicted.get(col), expected);
        }
    }
}
