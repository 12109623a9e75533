//! Property-based tests for the debit engine

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::AccountKey;
use domain_charging::constants::MONETARY;
use domain_charging::{
    action, debit_credit_balance, select_balances, Account, AccountSet, Action, BalanceFilter, BalanceQuery,
    DebitOptions, SharedGroup, ThresholdType,
};
use infra_store::RatePlan;
use test_utils::{
    assert_no_negative_balances, call_seconds_strategy, money_balances_strategy, ordered_sharing_strategy,
    positive_money_strategy, ChargingWorld, TestAccountBuilder, TestBalanceBuilder, TestCallBuilder,
    TestTriggerBuilder, TENANT,
};

fn account_with(balances: Vec<domain_charging::Balance>) -> Account {
    balances
        .into_iter()
        .fold(TestAccountBuilder::new("rif"), |builder, balance| builder.with_balance(MONETARY, balance))
        .build()
}

fn without_debt() -> DebitOptions {
    DebitOptions {
        count: false,
        dry_run: false,
        go_negative: false,
    }
}

// ============================================================================
// Selection Properties
// ============================================================================

mod selection_properties {
    use super::*;

    proptest! {
        #[test]
        fn prop_selection_is_ordered_and_stable(balances in money_balances_strategy(8)) {
            let world = ChargingWorld::new();
            let account = account_with(balances);
            let query = BalanceQuery::new("0723", "call", "*out", MONETARY);
            let now = Utc::now();

            let first = select_balances(&account, &query, world.storage.as_ref(), 1, now).unwrap();
            let second = select_balances(&account, &query, world.storage.as_ref(), 1, now).unwrap();

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.len(), account.balances(MONETARY).len());
            for pair in first.windows(2) {
                prop_assert!(pair[0].weight > pair[1].weight);
            }
        }
    }
}

// ============================================================================
// Debit Properties
// ============================================================================

mod debit_properties {
    use super::*;

    proptest! {
        #[test]
        fn prop_debited_value_equals_cost(
            balances in money_balances_strategy(5),
            seconds in call_seconds_strategy(),
        ) {
            let world = ChargingWorld::new();
            let mut account = account_with(balances);
            let before = account.total_value(MONETARY);
            let cd = TestCallBuilder::new("rif", "0723").lasting(seconds).build();

            let ctx = world.context();
            let cc = {
                let mut set = AccountSet::new(&mut account);
                debit_credit_balance(&mut set, &cd, without_debt(), &ctx).unwrap()
            };

            let after = account.total_value(MONETARY);
            prop_assert_eq!(before - after, cc.cost);
            prop_assert!(cc.duration() <= Duration::seconds(seconds));
            prop_assert!(cc.increments().all(|inc| inc.is_paid()));
            assert_no_negative_balances(&account);
        }

        #[test]
        fn prop_connect_fee_charged_at_most_once(
            balances in money_balances_strategy(5),
            seconds in call_seconds_strategy(),
            fee in positive_money_strategy(),
        ) {
            let world = ChargingWorld::with_plans([RatePlan::per_minute("", dec!(0.6), 1).with_connect_fee(fee)]);
            let mut account = account_with(balances);
            let before = account.total_value(MONETARY);
            let cd = TestCallBuilder::new("rif", "0723").lasting(seconds).build();

            let ctx = world.context();
            let cc = {
                let mut set = AccountSet::new(&mut account);
                debit_credit_balance(&mut set, &cd, without_debt(), &ctx).unwrap()
            };

            let fee_part = cc.cost - cc.timespans_cost();
            prop_assert!(fee_part == Decimal::ZERO || fee_part == fee);
            prop_assert_eq!(before - account.total_value(MONETARY), cc.cost);
            assert_no_negative_balances(&account);
        }

        #[test]
        fn prop_going_negative_only_on_default_balance(
            balances in money_balances_strategy(3),
            seconds in call_seconds_strategy(),
        ) {
            let world = ChargingWorld::new();
            let mut account = account_with(balances);
            let cd = TestCallBuilder::new("rif", "0723").lasting(seconds).build();

            let ctx = world.context();
            let cc = {
                let mut set = AccountSet::new(&mut account);
                debit_credit_balance(&mut set, &cd, DebitOptions::charge(), &ctx).unwrap()
            };

            prop_assert_eq!(cc.duration(), Duration::seconds(seconds));
            for balance in account.balances(MONETARY) {
                prop_assert!(balance.is_default() || balance.value() >= Decimal::ZERO);
            }
        }

        #[test]
        fn prop_max_session_within_request(
            balances in money_balances_strategy(3),
            seconds in call_seconds_strategy(),
        ) {
            let world = ChargingWorld::new();
            world.add_account(account_with(balances));
            let cd = TestCallBuilder::new("rif", "0723").lasting(seconds).build();

            let limit = world.responder.max_session_duration(&cd).unwrap().unwrap();

            prop_assert!(limit <= Duration::seconds(seconds));
            prop_assert!(limit >= Duration::zero());
        }
    }
}

// ============================================================================
// Trigger Properties
// ============================================================================

mod trigger_properties {
    use super::*;

    proptest! {
        #[test]
        fn prop_non_recurrent_trigger_fires_once(passes in 1usize..6) {
            let world = ChargingWorld::new();
            world.add_actions(
                "TOPUP_BONUS",
                vec![Action::new(action::TOPUP).with_balance(BalanceFilter {
                    id: Some("bonus".to_string()),
                    value: Some(dec!(5)),
                    ..BalanceFilter::of_type(MONETARY)
                })],
            );
            let mut account = TestAccountBuilder::new("rif")
                .with_money("main", dec!(150))
                .with_trigger(
                    TestTriggerBuilder::new("MAX_100", ThresholdType::MaxBalance, dec!(100), "TOPUP_BONUS")
                        .on_type(MONETARY)
                        .build(),
                )
                .build();

            for _ in 0..passes {
                for balance in account.balance_map.values_mut().flatten() {
                    balance.mark_dirty();
                }
                account.execute_action_triggers(None, &world.context());
            }

            let bonus: Decimal = account
                .balances(MONETARY)
                .iter()
                .filter(|b| b.id == "bonus")
                .map(|b| b.value())
                .sum();
            prop_assert_eq!(bonus, dec!(5));
        }
    }
}

// ============================================================================
// Shared Group Properties
// ============================================================================

mod shared_group_properties {
    use super::*;

    proptest! {
        #[test]
        fn prop_non_member_balance_untouched(
            strategy in ordered_sharing_strategy(),
            member_value in positive_money_strategy(),
            seconds in call_seconds_strategy(),
        ) {
            let world = ChargingWorld::new();
            let alice = AccountKey::new(TENANT, "alice");
            let bob = AccountKey::new(TENANT, "bob");
            world.add_shared_group(
                SharedGroup::new("SG")
                    .with_strategy(strategy)
                    .with_member(alice.clone())
                    .with_member(bob),
            );
            let pooled = |value| TestBalanceBuilder::new("pool", value).with_shared_group("SG").build();
            world.add_account(TestAccountBuilder::new("alice").with_balance(MONETARY, pooled(Decimal::ZERO)).build());
            world.add_account(TestAccountBuilder::new("bob").with_balance(MONETARY, pooled(member_value)).build());
            world.add_account(TestAccountBuilder::new("carol").with_balance(MONETARY, pooled(dec!(1000))).build());
            let cd = TestCallBuilder::new("alice", "0723").lasting(seconds).build();

            world.responder.debit(&cd).unwrap();

            prop_assert_eq!(world.account("carol").total_value(MONETARY), dec!(1000));
            prop_assert!(world.account("bob").total_value(MONETARY) >= Decimal::ZERO);
        }
    }
}
