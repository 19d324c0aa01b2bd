//! Property-based tests for the block-index allocator
//!
//! - Uniqueness and exhaustiveness of concurrent claims
//! - Reset restarts a generation at zero
//! - Cross-color and cross-generation independence
//! - Record spacing of both tables

use std::collections::HashSet;
use std::sync::Arc;

use fgpu::bindex::{BlockIndexTable, Generation};
use fgpu::indicator::IndicatorTable;
use fgpu::layout::CACHELINE_SIZE;
use proptest::prelude::*;

fn any_generation() -> impl Strategy<Value = Generation> {
    prop_oneof![Just(Generation::Zero), Just(Generation::One)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// N claimants each claiming once see exactly {0, .., N-1}
    #[test]
    fn prop_concurrent_claims_unique_and_gapless(
        claimants in 1usize..32,
        color in 0usize..4,
        generation in any_generation(),
    ) {
        let table: Arc<BlockIndexTable<4>> = Arc::new(BlockIndexTable::new());
        let handles: Vec<_> = (0..claimants)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || table.claim(color, generation))
            })
            .collect();

        let mut ordinals: Vec<i32> = handles
            .into_iter()
            .map(|h| h.join().expect("claimant panicked"))
            .collect();
        ordinals.sort_unstable();
        prop_assert_eq!(ordinals, (0..claimants as i32).collect::<Vec<_>>());
    }

    /// After a reset the first claim is zero, whatever came before
    #[test]
    fn prop_reset_restarts_at_zero(
        prior in 0usize..500,
        color in 0usize..4,
        generation in any_generation(),
    ) {
        let table: BlockIndexTable<4> = BlockIndexTable::new();
        for _ in 0..prior {
            table.claim(color, generation);
        }
        table.reset(color, generation);
        prop_assert_eq!(table.claim(color, generation), 0);
    }

    /// Claims on one (color, generation) never move any other counter
    #[test]
    fn prop_claims_touch_one_counter(
        claims in 1usize..200,
        color in 0usize..4,
        generation in any_generation(),
    ) {
        let table: BlockIndexTable<4> = BlockIndexTable::new();
        for _ in 0..claims {
            table.claim(color, generation);
        }
        for (c, pair) in table.snapshot().into_iter().enumerate() {
            for g in Generation::ALL {
                let expected = if c == color && g == generation { claims as i32 } else { 0 };
                prop_assert_eq!(pair[g.index()], expected);
            }
        }
    }

    /// Bounded claims across several threads deliver every unit exactly once
    #[test]
    fn prop_bounded_claims_exhaustive(
        threads in 1usize..8,
        total in 0i32..2000,
    ) {
        let table: Arc<BlockIndexTable<2>> = Arc::new(BlockIndexTable::new());
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    std::iter::from_fn(|| table.claim_bounded(0, Generation::One, total))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for ordinal in handle.join().expect("claimant panicked") {
                prop_assert!(seen.insert(ordinal), "ordinal {} delivered twice", ordinal);
            }
        }
        prop_assert_eq!(seen.len(), total as usize);
        // Each thread made exactly one terminating claim
        prop_assert_eq!(table.load(0, Generation::One), total + threads as i32);
    }
}

#[test]
fn test_color_records_one_line_apart_in_memory() {
    let table: BlockIndexTable<8> = BlockIndexTable::new();
    let base = table.as_ptr() as usize;
    assert_eq!(base % CACHELINE_SIZE, 0);
    for color in 0..8 {
        // SAFETY: color < capacity
        let addr = unsafe { table.as_ptr().add(color) } as usize;
        assert_eq!(addr - base, color * CACHELINE_SIZE);
    }
}

#[test]
fn test_indicator_records_one_line_apart_in_memory() {
    let table: IndicatorTable<32> = IndicatorTable::new();
    let base = table.as_ptr() as usize;
    assert_eq!(base % CACHELINE_SIZE, 0);
    // SAFETY: capacity is 32
    let second = unsafe { table.as_ptr().add(1) } as usize;
    assert!(second - base >= CACHELINE_SIZE);
}
