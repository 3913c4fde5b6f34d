//! Benchmarks for `BlinkTree` using Divan.
//!
//! Run with: `cargo bench --bench tree`

use std::sync::Arc;

use blinktree::{BlinkTree, MemStore, TreeConfig, U64DeltaKeyCodec, U64ValueCodec, ValueStorage};
use divan::{black_box, Bencher};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Tree = BlinkTree<u64, u64, MemStore>;

fn main() {
    divan::main();
}

fn new_tree(max_node_size: usize) -> Tree {
    let store = Arc::new(MemStore::new());
    let config = TreeConfig::new(
        Arc::new(U64DeltaKeyCodec),
        ValueStorage::Inline(Arc::new(U64ValueCodec)),
    )
    .with_max_node_size(max_node_size);
    BlinkTree::create(store, config).expect("create tree")
}

fn filled_tree(keys: u64) -> Tree {
    let tree = new_tree(32);
    for key in 0..keys {
        tree.put(key, key).expect("put");
    }
    tree
}

// =============================================================================
// Inserts
// =============================================================================

#[divan::bench_group]
mod insert {
    use super::*;

    #[divan::bench(args = [1_000, 10_000])]
    fn sequential(bencher: Bencher, keys: u64) {
        bencher
            .with_inputs(|| new_tree(32))
            .bench_values(|tree| {
                for key in 0..keys {
                    tree.put(black_box(key), key).expect("put");
                }
                tree
            });
    }

    #[divan::bench(args = [1_000, 10_000])]
    fn random(bencher: Bencher, keys: u64) {
        bencher
            .with_inputs(|| {
                let mut rng = StdRng::seed_from_u64(0xB11A);
                let shuffled: Vec<u64> = (0..keys).map(|_| rng.gen()).collect();
                (new_tree(32), shuffled)
            })
            .bench_values(|(tree, shuffled)| {
                for key in shuffled {
                    tree.put(black_box(key), key).expect("put");
                }
                tree
            });
    }
}

// =============================================================================
// Lookups
// =============================================================================

#[divan::bench_group]
mod lookup {
    use super::*;

    #[divan::bench]
    fn hit(bencher: Bencher) {
        let tree = filled_tree(10_000);
        let mut rng = StdRng::seed_from_u64(0x5EED);
        bencher.bench_local(|| {
            let key = rng.gen_range(0..10_000);
            black_box(tree.get(&key).expect("get"))
        });
    }

    #[divan::bench]
    fn miss(bencher: Bencher) {
        let tree = filled_tree(10_000);
        bencher.bench_local(|| black_box(tree.get(&20_000).expect("get")));
    }
}

// =============================================================================
// Scans
// =============================================================================

#[divan::bench_group]
mod scan {
    use super::*;

    #[divan::bench]
    fn full_iteration(bencher: Bencher) {
        let tree = filled_tree(10_000);
        bencher.bench_local(|| {
            let count = tree.iter().count();
            black_box(count)
        });
    }

    #[divan::bench]
    fn bounded_range(bencher: Bencher) {
        let tree = filled_tree(10_000);
        bencher.bench_local(|| {
            let values = tree
                .range_scan(Some(&2_500), true, Some(&7_500), false)
                .expect("scan");
            black_box(values.len())
        });
    }
}
