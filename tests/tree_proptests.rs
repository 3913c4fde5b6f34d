//! Property-based tests for the tree.
//!
//! Differential testing against `std::collections::BTreeMap` as an oracle:
//! the same operation sequence is applied to both, and every observable
//! (point lookups, ordered iteration, range scans, size) must agree. Trees
//! run with a small max node size so even modest inputs split several
//! levels deep.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use blinktree::{BlinkTree, MemStore, TreeConfig, U64DeltaKeyCodec, U64ValueCodec, ValueStorage};
use proptest::prelude::*;

type Tree = BlinkTree<u64, u64, MemStore>;

fn tree_with_node_size(max_node_size: usize) -> Tree {
    let store = Arc::new(MemStore::new());
    let config = TreeConfig::new(
        Arc::new(U64DeltaKeyCodec),
        ValueStorage::Inline(Arc::new(U64ValueCodec)),
    )
    .with_max_node_size(max_node_size)
    .with_counter();
    BlinkTree::create(store, config).unwrap()
}

// ============================================================================
//  Strategies
// ============================================================================

/// Small key space so sequences collide often enough to hit the overwrite
/// and remove-found paths.
fn key() -> impl Strategy<Value = u64> {
    0u64..512
}

/// Operations for random sequences.
#[derive(Debug, Clone)]
enum Op {
    Put(u64, u64),
    PutIfAbsent(u64, u64),
    Remove(u64),
    Replace(u64, u64),
    Get(u64),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (key(), any::<u64>()).prop_map(|(k, v)| Op::Put(k, v)),
            1 => (key(), any::<u64>()).prop_map(|(k, v)| Op::PutIfAbsent(k, v)),
            2 => key().prop_map(Op::Remove),
            1 => (key(), any::<u64>()).prop_map(|(k, v)| Op::Replace(k, v)),
            2 => key().prop_map(Op::Get),
        ],
        0..=max_ops,
    )
}

fn key_value_pairs(max_count: usize) -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((key(), any::<u64>()), 0..=max_count)
}

// ============================================================================
//  Basic round-trip properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every inserted pair is retrievable.
    #[test]
    fn insert_then_get(pairs in key_value_pairs(200)) {
        let tree = tree_with_node_size(6);
        let mut oracle = BTreeMap::new();
        for (k, v) in pairs {
            prop_assert_eq!(tree.put(k, v).unwrap(), oracle.insert(k, v));
        }
        for (k, v) in &oracle {
            prop_assert_eq!(tree.get(k).unwrap(), Some(*v));
        }
        tree.check_invariants().unwrap();
    }

    /// Second insert overwrites and reports the first value.
    #[test]
    fn overwrite_returns_old(k in key(), v1: u64, v2: u64) {
        let tree = tree_with_node_size(6);
        prop_assert_eq!(tree.put(k, v1).unwrap(), None);
        prop_assert_eq!(tree.put(k, v2).unwrap(), Some(v1));
        prop_assert_eq!(tree.get(&k).unwrap(), Some(v2));
    }

    /// put_if_absent never replaces.
    #[test]
    fn put_if_absent_is_a_noop_on_hits(k in key(), v1: u64, v2: u64) {
        let tree = tree_with_node_size(6);
        prop_assert_eq!(tree.put_if_absent(k, v1).unwrap(), None);
        prop_assert_eq!(tree.put_if_absent(k, v2).unwrap(), Some(v1));
        prop_assert_eq!(tree.get(&k).unwrap(), Some(v1));
    }

    /// Remove round-trip.
    #[test]
    fn put_remove_get(k in key(), v: u64) {
        let tree = tree_with_node_size(6);
        tree.put(k, v).unwrap();
        prop_assert_eq!(tree.remove(&k).unwrap(), Some(v));
        prop_assert_eq!(tree.get(&k).unwrap(), None);
        prop_assert_eq!(tree.remove(&k).unwrap(), None);
    }
}

// ============================================================================
//  Differential operation sequences
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Arbitrary op sequences agree with the oracle on every observable.
    #[test]
    fn random_ops_match_oracle(ops in operations(300)) {
        let tree = tree_with_node_size(6);
        let mut oracle: BTreeMap<u64, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    prop_assert_eq!(tree.put(k, v).unwrap(), oracle.insert(k, v));
                }
                Op::PutIfAbsent(k, v) => {
                    let expected = oracle.get(&k).copied();
                    prop_assert_eq!(tree.put_if_absent(k, v).unwrap(), expected);
                    oracle.entry(k).or_insert(v);
                }
                Op::Remove(k) => {
                    prop_assert_eq!(tree.remove(&k).unwrap(), oracle.remove(&k));
                }
                Op::Replace(k, v) => {
                    let expected = oracle.get(&k).copied();
                    prop_assert_eq!(tree.replace(&k, v).unwrap(), expected);
                    if let Some(slot) = oracle.get_mut(&k) {
                        *slot = v;
                    }
                }
                Op::Get(k) => {
                    prop_assert_eq!(tree.get(&k).unwrap(), oracle.get(&k).copied());
                }
            }
        }

        // final state agrees in order, content, and size
        let entries: Vec<(u64, u64)> = tree.iter().map(Result::unwrap).collect();
        let expected: Vec<(u64, u64)> = oracle.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(entries, expected);
        prop_assert_eq!(tree.len().unwrap(), oracle.len() as u64);

        let stats = tree.check_invariants().unwrap();
        prop_assert_eq!(stats.entry_count, oracle.len() as u64);
    }

    /// Range scans agree with the oracle under every bound combination.
    #[test]
    fn range_scans_match_oracle(
        pairs in key_value_pairs(200),
        lo in key(),
        hi in key(),
        lo_inc: bool,
        hi_inc: bool,
    ) {
        let tree = tree_with_node_size(6);
        let mut oracle = BTreeMap::new();
        for (k, v) in pairs {
            tree.put(k, v).unwrap();
            oracle.insert(k, v);
        }

        let lower = if lo_inc { Bound::Included(lo) } else { Bound::Excluded(lo) };
        let upper = if hi_inc { Bound::Included(hi) } else { Bound::Excluded(hi) };
        let expected: Vec<u64> = match (lo, hi) {
            _ if lo > hi => Vec::new(),
            _ if lo == hi && !(lo_inc || hi_inc) => Vec::new(),
            _ if lo == hi => oracle.get(&lo).copied().into_iter().collect(),
            _ => oracle.range((lower, upper)).map(|(_, v)| *v).collect(),
        };
        let scanned = tree.range_scan(Some(&lo), lo_inc, Some(&hi), hi_inc).unwrap();
        prop_assert_eq!(scanned, expected);

        // one-sided scans
        let from_lo: Vec<u64> = oracle.range(lo..).map(|(_, v)| *v).collect();
        prop_assert_eq!(tree.range_scan(Some(&lo), true, None, false).unwrap(), from_lo);
        let to_hi: Vec<u64> = oracle.range(..hi).map(|(_, v)| *v).collect();
        prop_assert_eq!(tree.range_scan(None, true, Some(&hi), false).unwrap(), to_hi);
    }

    /// Navigation agrees with the oracle.
    #[test]
    fn navigation_matches_oracle(pairs in key_value_pairs(150), probe in key()) {
        let tree = tree_with_node_size(6);
        let mut oracle = BTreeMap::new();
        for (k, v) in pairs {
            tree.put(k, v).unwrap();
            oracle.insert(k, v);
        }

        let higher = oracle.range((Bound::Excluded(probe), Bound::Unbounded)).next();
        prop_assert_eq!(tree.higher_key(&probe).unwrap(), higher.map(|(k, _)| *k));

        let ceiling = oracle.range(probe..).next();
        prop_assert_eq!(tree.ceiling_key(&probe).unwrap(), ceiling.map(|(k, _)| *k));

        let lower = oracle.range(..probe).next_back();
        prop_assert_eq!(tree.lower_key(&probe).unwrap(), lower.map(|(k, _)| *k));

        let floor = oracle.range(..=probe).next_back();
        prop_assert_eq!(tree.floor_key(&probe).unwrap(), floor.map(|(k, _)| *k));

        prop_assert_eq!(
            tree.first_entry().unwrap(),
            oracle.first_key_value().map(|(k, v)| (*k, *v))
        );
        prop_assert_eq!(
            tree.last_entry().unwrap(),
            oracle.last_key_value().map(|(k, v)| (*k, *v))
        );
    }

    /// Descending iteration is the exact reverse of ascending.
    #[test]
    fn descending_matches_reversed_ascending(pairs in key_value_pairs(120)) {
        let tree = tree_with_node_size(6);
        for (k, v) in pairs {
            tree.put(k, v).unwrap();
        }
        let mut ascending: Vec<(u64, u64)> = tree.iter().map(Result::unwrap).collect();
        let descending: Vec<(u64, u64)> =
            tree.iter_descending().map(Result::unwrap).collect();
        ascending.reverse();
        prop_assert_eq!(descending, ascending);
    }

    /// Every split pattern the sequence produces still reads back
    /// consistently (the store re-decodes nodes on each access, so a full
    /// readback exercises the codec on every node).
    #[test]
    fn varied_node_sizes_stay_consistent(pairs in key_value_pairs(300), half in 3usize..8) {
        let tree = tree_with_node_size(half * 2);
        let mut oracle = BTreeMap::new();
        for (k, v) in pairs {
            tree.put(k, v).unwrap();
            oracle.insert(k, v);
        }
        let entries: Vec<(u64, u64)> = tree.iter().map(Result::unwrap).collect();
        let expected: Vec<(u64, u64)> = oracle.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(entries, expected);
        tree.check_invariants().unwrap();
    }
}
