//! Shared group tests: pooled selection, sharing strategies, membership and
//! persistence of peers

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::AccountKey;
use domain_charging::constants::MONETARY;
use domain_charging::{debit_credit_balance, AccountSet, DebitOptions, SharedGroup, SharingStrategy};
use test_utils::{
    assert_balance_value, assert_covers, ChargingWorld, TestAccountBuilder, TestBalanceBuilder, TestCallBuilder,
    TENANT,
};

fn key(name: &str) -> AccountKey {
    AccountKey::new(TENANT, name)
}

fn shared(id: &str, value: Decimal) -> domain_charging::Balance {
    TestBalanceBuilder::new(id, value).with_shared_group("SG").build()
}

/// A and B share "SG"; A's pooled balance is empty, B's holds `b_value`
fn family(world: &ChargingWorld, strategy: SharingStrategy, a_value: Decimal, b_value: Decimal) {
    world.add_shared_group(
        SharedGroup::new("SG")
            .with_strategy(strategy)
            .with_member(key("alice"))
            .with_member(key("bob")),
    );
    world.add_account(TestAccountBuilder::new("alice").with_balance(MONETARY, shared("pool", a_value)).build());
    world.add_account(TestAccountBuilder::new("bob").with_balance(MONETARY, shared("pool", b_value)).build());
}

// ============================================================================
// Pooling Tests
// ============================================================================

mod pooling_tests {
    use super::*;

    #[test]
    fn test_member_with_empty_balance_is_paid_by_peer() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::Highest, Decimal::ZERO, dec!(20));
        let cd = TestCallBuilder::new("alice", "0723").lasting(100).build();

        let cc = world.responder.debit(&cd).unwrap();

        assert_eq!(cc.cost, dec!(1));
        assert_covers(&cc, Duration::seconds(100));
        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(19));
        assert_balance_value(&world.account("alice"), MONETARY, "pool", Decimal::ZERO);
        let payer = cc.increments().next().unwrap().balance_info.account_id.clone();
        assert_eq!(payer, Some(key("bob")));
    }

    #[test]
    fn test_highest_strategy_prefers_richest_member() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::Highest, dec!(5), dec!(20));
        let cd = TestCallBuilder::new("alice", "0723").lasting(100).build();

        world.responder.debit(&cd).unwrap();

        assert_balance_value(&world.account("alice"), MONETARY, "pool", dec!(5));
        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(19));
    }

    #[test]
    fn test_lowest_strategy_prefers_poorest_member() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::Lowest, dec!(20), dec!(5));
        let cd = TestCallBuilder::new("alice", "0723").lasting(100).build();

        world.responder.debit(&cd).unwrap();

        assert_balance_value(&world.account("alice"), MONETARY, "pool", dec!(20));
        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(4));
    }

    #[test]
    fn test_mine_highest_uses_own_balance_first() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::MineHighest, dec!(5), dec!(20));
        let cd = TestCallBuilder::new("alice", "0723").lasting(100).build();

        world.responder.debit(&cd).unwrap();

        assert_balance_value(&world.account("alice"), MONETARY, "pool", dec!(4));
        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(20));
    }

    #[test]
    fn test_pool_spills_over_to_next_member() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::MineHighest, dec!(0.5), dec!(20));
        let cd = TestCallBuilder::new("alice", "0723").lasting(100).build();

        let cc = world.responder.debit(&cd).unwrap();

        assert_eq!(cc.cost, dec!(1));
        assert_balance_value(&world.account("alice"), MONETARY, "pool", Decimal::ZERO);
        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(19.5));
    }

    #[test]
    fn test_own_unshared_balances_come_before_the_pool_when_heavier() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::Highest, Decimal::ZERO, dec!(20));
        let mut alice = world.account("alice");
        alice.add_balance(MONETARY, TestBalanceBuilder::new("own", dec!(10)).with_weight(10.0).build());
        world.add_account(alice);
        let cd = TestCallBuilder::new("alice", "0723").lasting(100).build();

        world.responder.debit(&cd).unwrap();

        assert_balance_value(&world.account("alice"), MONETARY, "own", dec!(9));
        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(20));
    }
}

// ============================================================================
// Membership Tests
// ============================================================================

mod membership_tests {
    use super::*;

    #[test]
    fn test_non_member_balance_is_never_pooled() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::Highest, Decimal::ZERO, dec!(5));
        world.add_account(TestAccountBuilder::new("carol").with_balance(MONETARY, shared("pool", dec!(100))).build());
        let cd = TestCallBuilder::new("alice", "0723").lasting(100).build();

        world.responder.debit(&cd).unwrap();

        assert_balance_value(&world.account("carol"), MONETARY, "pool", dec!(100));
        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(4));
    }

    #[test]
    fn test_missing_group_charges_own_balance() {
        let world = ChargingWorld::new();
        let mut alice = TestAccountBuilder::new("alice")
            .with_balance(MONETARY, TestBalanceBuilder::new("ghost", dec!(10)).with_shared_group("GHOST").build())
            .build();
        let cd = TestCallBuilder::new("alice", "0723").lasting(60).build();

        let ctx = world.context();
        let cc = {
            let mut set = AccountSet::new(&mut alice);
            let opts = DebitOptions {
                count: false,
                dry_run: false,
                go_negative: false,
            };
            debit_credit_balance(&mut set, &cd, opts, &ctx).unwrap()
        };

        assert_eq!(cc.cost, dec!(0.6));
        assert_covers(&cc, Duration::seconds(60));
        assert_balance_value(&alice, MONETARY, "ghost", dec!(9.4));
    }

    #[test]
    fn test_members_locked_together() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::Highest, Decimal::ZERO, dec!(5));
        let alice = world.account("alice");
        let cd = TestCallBuilder::new("alice", "0723").build();

        let members = alice.unique_shared_group_members(&cd, &world.context()).unwrap();

        assert_eq!(members.len(), 2);
        assert!(members.contains(&key("alice")));
        assert!(members.contains(&key("bob")));
    }

    #[test]
    fn test_account_joins_group_on_topup() {
        use domain_charging::{action, AccountingStorage, Action, BalanceFilter, StringMap};

        let world = ChargingWorld::new();
        world.add_shared_group(SharedGroup::new("SG").with_strategy(SharingStrategy::Highest));
        world.add_actions(
            "JOIN_SG",
            vec![Action::new(action::TOPUP).with_balance(BalanceFilter {
                id: Some("pool".to_string()),
                value: Some(dec!(5)),
                shared_groups: Some(StringMap::parse("SG")),
                ..BalanceFilter::of_type(MONETARY)
            })],
        );
        world.add_account(TestAccountBuilder::new("dave").build());

        world.responder.execute_actions(&key("dave"), "JOIN_SG").unwrap();

        let group = world.storage.get_shared_group("SG", false).unwrap();
        assert!(group.has_member(&key("dave")));
        assert_balance_value(&world.account("dave"), MONETARY, "pool", dec!(5));
    }

    #[test]
    fn test_join_reports_lock_timeout() {
        use domain_charging::shared_group::shared_group_lock_id;
        use domain_charging::{
            action, AccountingStorage, Action, BalanceFilter, ChargingConfig, ChargingError, Guardian, Responder,
            StringMap,
        };

        let world = ChargingWorld::new();
        world.add_shared_group(SharedGroup::new("SG").with_strategy(SharingStrategy::Highest));
        world.add_actions(
            "JOIN_SG",
            vec![Action::new(action::TOPUP).with_balance(BalanceFilter {
                id: Some("pool".to_string()),
                value: Some(dec!(5)),
                shared_groups: Some(StringMap::parse("SG")),
                ..BalanceFilter::of_type(MONETARY)
            })],
        );
        world.add_account(TestAccountBuilder::new("dave").build());
        let responder = Responder::new(
            world.storage.clone(),
            world.rater.clone(),
            world.locker.clone(),
            ChargingConfig {
                lock_timeout_ms: 50,
                ..ChargingConfig::default()
            },
        );

        let held = vec![shared_group_lock_id("SG")];
        let mut result = None;
        world
            .locker
            .guard(&held, std::time::Duration::from_millis(50), &mut || {
                result = Some(responder.execute_actions(&key("dave"), "JOIN_SG"));
                Ok(())
            })
            .unwrap();

        let err = result.unwrap().unwrap_err();
        assert!(matches!(err, ChargingError::LockTimeout { .. }));
        let group = world.storage.get_shared_group("SG", false).unwrap();
        assert!(group.member_ids.is_empty());
    }
}

// ============================================================================
// Refund Tests
// ============================================================================

mod refund_tests {
    use super::*;

    #[test]
    fn test_refund_returns_credit_to_paying_peer() {
        let world = ChargingWorld::new();
        family(&world, SharingStrategy::Highest, Decimal::ZERO, dec!(20));
        let mut cd = TestCallBuilder::new("alice", "0723").lasting(100).build();
        let cc = world.responder.debit(&cd).unwrap();
        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(19));

        cd.increments = cc.increments().cloned().collect();
        world.responder.refund_increments(&cd).unwrap();

        assert_balance_value(&world.account("bob"), MONETARY, "pool", dec!(20));
        assert_balance_value(&world.account("alice"), MONETARY, "pool", Decimal::ZERO);
    }
}
