//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use domain_charging::{Balance, SharingStrategy};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for strictly positive money values (0.01 to 100.00)
pub fn positive_money_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for call lengths in seconds (1s to 10m)
pub fn call_seconds_strategy() -> impl Strategy<Value = i64> {
    1i64..=600i64
}

/// Strategy for a chain of positive money balances with distinct weights,
/// in random order
pub fn money_balances_strategy(max_len: usize) -> impl Strategy<Value = Vec<Balance>> {
    prop::collection::btree_set(0u32..100u32, 1..=max_len)
        .prop_flat_map(|weights| {
            let len = weights.len();
            (
                Just(weights.into_iter().collect::<Vec<_>>()),
                prop::collection::vec(positive_money_strategy(), len),
            )
        })
        .prop_map(|(weights, values)| {
            weights
                .into_iter()
                .zip(values)
                .enumerate()
                .map(|(index, (weight, value))| {
                    let mut balance = Balance::new(format!("b{}", index), value);
                    balance.weight = f64::from(weight);
                    balance
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Strategy for sharing strategies with a deterministic order
pub fn ordered_sharing_strategy() -> impl Strategy<Value = SharingStrategy> {
    prop_oneof![
        Just(SharingStrategy::Highest),
        Just(SharingStrategy::Lowest),
        Just(SharingStrategy::MineHighest),
        Just(SharingStrategy::MineLowest),
    ]
}
