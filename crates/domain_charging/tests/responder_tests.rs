//! Responder tests: pricing, debits, session limits, refunds and action
//! execution against the in-memory store

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::AccountKey;
use domain_charging::constants::{MONETARY, VOICE};
use domain_charging::{
    action, Account, Action, ActionRegistry, BalanceFilter, ChargingContext, ChargingError, Responder,
};
use test_utils::{
    assert_balance_value, assert_covers, assert_fully_paid, assert_no_negative_balances, ChargingWorld,
    TestAccountBuilder, TestCallBuilder, TENANT,
};

fn key(name: &str) -> AccountKey {
    AccountKey::new(TENANT, name)
}

// ============================================================================
// Get Cost Tests
// ============================================================================

mod get_cost_tests {
    use super::*;

    #[test]
    fn test_get_cost_prices_without_charging() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(10)).build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(90).build();

        let cc = world.responder.get_cost(&cd).unwrap();

        assert_eq!(cc.cost, dec!(0.9));
        assert_balance_value(&world.account("rif"), MONETARY, "main", dec!(10));
    }

    #[test]
    fn test_get_cost_needs_no_account() {
        let world = ChargingWorld::new();
        let cd = TestCallBuilder::new("nobody", "0723").lasting(60).build();

        let cc = world.responder.get_cost(&cd).unwrap();

        assert_eq!(cc.cost, dec!(0.6));
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let world = ChargingWorld::new();
        let mut cd = TestCallBuilder::new("rif", "0723").build();
        cd.time_end = cd.time_start - Duration::seconds(1);

        let err = world.responder.get_cost(&cd).unwrap_err();

        assert!(matches!(err, ChargingError::InvalidInput(_)));
    }

    #[test]
    fn test_overlong_call_is_rejected() {
        let world = ChargingWorld::new();
        let cd = TestCallBuilder::new("rif", "0723").lasting(4 * 3600).build();

        let err = world.responder.get_cost(&cd).unwrap_err();

        assert!(matches!(err, ChargingError::InvalidInput(_)));
    }
}

// ============================================================================
// Debit Tests
// ============================================================================

mod debit_tests {
    use super::*;

    #[test]
    fn test_debit_persists_account() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(10)).build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(400).build();

        let cc = world.responder.debit(&cd).unwrap();

        assert_eq!(cc.cost, dec!(4));
        assert_fully_paid(&cc);
        assert_balance_value(&world.account("rif"), MONETARY, "main", dec!(6));
    }

    #[test]
    fn test_debit_unknown_account() {
        let world = ChargingWorld::new();
        let cd = TestCallBuilder::new("nobody", "0723").build();

        let err = world.responder.debit(&cd).unwrap_err();

        assert!(err.is_not_found());
    }

    #[test]
    fn test_debit_disabled_account() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(10)).disabled().build());
        let cd = TestCallBuilder::new("rif", "0723").build();

        let err = world.responder.debit(&cd).unwrap_err();

        assert!(matches!(err, ChargingError::AccountDisabled(_)));
        assert_balance_value(&world.account("rif"), MONETARY, "main", dec!(10));
    }

    #[test]
    fn test_debit_goes_negative_even_without_permission() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(0.3)).build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(60).build();

        let cc = world.responder.debit(&cd).unwrap();

        assert_eq!(cc.cost, dec!(0.6));
        assert_balance_value(&world.account("rif"), MONETARY, "*default", dec!(-0.3));
    }

    #[test]
    fn test_debit_lock_released_after_call() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(10)).build());
        let cd = TestCallBuilder::new("rif", "0723").build();

        world.responder.debit(&cd).unwrap();

        assert!(!world.locker.is_held(&key("rif").to_string()));
        world.responder.debit(&cd).unwrap();
        assert_balance_value(&world.account("rif"), MONETARY, "main", dec!(8.8));
    }
}

// ============================================================================
// Session Limit Tests
// ============================================================================

mod session_tests {
    use super::*;

    #[test]
    fn test_max_session_limited_by_credit() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(1)).build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(120).build();

        let limit = world.responder.max_session_duration(&cd).unwrap();

        assert_eq!(limit, Some(Duration::seconds(100)));
        assert_balance_value(&world.account("rif"), MONETARY, "main", dec!(1));
    }

    #[test]
    fn test_max_session_capped_at_request() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(100)).build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(120).build();

        let limit = world.responder.max_session_duration(&cd).unwrap();

        assert_eq!(limit, Some(Duration::seconds(120)));
    }

    #[test]
    fn test_max_session_unlimited_when_negative_allowed() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").allow_negative().build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(120).build();

        assert_eq!(world.responder.max_session_duration(&cd).unwrap(), None);
    }

    #[test]
    fn test_max_session_sums_units_and_money() {
        let world = ChargingWorld::new();
        world.add_account(
            TestAccountBuilder::new("rif")
                .with_voice_seconds("minutes", 30)
                .with_money("main", dec!(0.1))
                .build(),
        );
        let cd = TestCallBuilder::new("rif", "0723").lasting(120).build();

        let limit = world.responder.max_session_duration(&cd).unwrap();

        assert_eq!(limit, Some(Duration::seconds(40)));
        assert_balance_value(&world.account("rif"), VOICE, "minutes", dec!(30));
    }

    #[test]
    fn test_max_session_zero_without_credit() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(120).build();

        assert_eq!(world.responder.max_session_duration(&cd).unwrap(), Some(Duration::zero()));
    }

    #[test]
    fn test_max_debit_shortens_request() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(1)).build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(120).build();

        let cc = world.responder.max_debit(&cd).unwrap();

        assert_eq!(cc.cost, dec!(1));
        assert_covers(&cc, Duration::seconds(100));
        let account = world.account("rif");
        assert_balance_value(&account, MONETARY, "main", Decimal::ZERO);
        assert_no_negative_balances(&account);
    }

    #[test]
    fn test_max_debit_rejects_empty_account() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(120).build();

        let err = world.responder.max_debit(&cd).unwrap_err();

        assert!(matches!(err, ChargingError::InsufficientCredit(_)));
    }

    #[test]
    fn test_max_debit_charges_full_request_when_negative_allowed() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(1)).allow_negative().build());
        let cd = TestCallBuilder::new("rif", "0723").lasting(120).build();

        let cc = world.responder.max_debit(&cd).unwrap();

        assert_eq!(cc.cost, dec!(1.2));
        assert_balance_value(&world.account("rif"), MONETARY, "*default", dec!(-0.2));
    }
}

// ============================================================================
// Refund Tests
// ============================================================================

mod refund_tests {
    use super::*;

    #[test]
    fn test_refund_restores_money() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(10)).build());
        let mut cd = TestCallBuilder::new("rif", "0723").lasting(60).build();
        let cc = world.responder.debit(&cd).unwrap();

        cd.increments = cc.increments().cloned().collect();
        world.responder.refund_increments(&cd).unwrap();

        assert_balance_value(&world.account("rif"), MONETARY, "main", dec!(10));
    }

    #[test]
    fn test_refund_restores_units() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_voice_seconds("minutes", 100).build());
        let mut cd = TestCallBuilder::new("rif", "0723").lasting(60).build();
        let cc = world.responder.debit(&cd).unwrap();
        assert_balance_value(&world.account("rif"), VOICE, "minutes", dec!(40));

        cd.increments = cc.increments().cloned().collect();
        world.responder.refund_increments(&cd).unwrap();

        assert_balance_value(&world.account("rif"), VOICE, "minutes", dec!(100));
    }

    #[test]
    fn test_partial_refund() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(10)).build());
        let mut cd = TestCallBuilder::new("rif", "0723").lasting(60).build();
        let cc = world.responder.debit(&cd).unwrap();

        cd.increments = cc.increments().skip(40).cloned().collect();
        world.responder.refund_increments(&cd).unwrap();

        assert_balance_value(&world.account("rif"), MONETARY, "main", dec!(9.6));
    }

    #[test]
    fn test_refund_without_increments_is_noop() {
        let world = ChargingWorld::new();
        let cd = TestCallBuilder::new("nobody", "0723").build();

        world.responder.refund_increments(&cd).unwrap();
    }

    #[test]
    fn test_refund_skips_vanished_account() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(10)).build());
        let mut cd = TestCallBuilder::new("rif", "0723").lasting(60).build();
        let cc = world.responder.debit(&cd).unwrap();
        world.storage.remove_account(&key("rif"));

        cd.increments = cc.increments().cloned().collect();

        assert!(world.responder.refund_increments(&cd).is_ok());
    }
}

// ============================================================================
// Execute Actions Tests
// ============================================================================

mod execute_actions_tests {
    use super::*;

    fn topup(id: &str, value: Decimal, weight: f64) -> Action {
        Action::new(action::TOPUP)
            .with_balance(BalanceFilter {
                id: Some(id.to_string()),
                value: Some(value),
                ..BalanceFilter::of_type(MONETARY)
            })
            .with_weight(weight)
    }

    #[test]
    fn test_topup_creates_account_and_balance() {
        let world = ChargingWorld::new();
        world.add_actions("WELCOME", vec![topup("main", dec!(10), 0.0)]);

        world.responder.execute_actions(&key("newbie"), "WELCOME").unwrap();

        assert_balance_value(&world.account("newbie"), MONETARY, "main", dec!(10));
    }

    #[test]
    fn test_topup_adds_to_existing_balance() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(1)).build());
        world.add_actions("TOPUP", vec![topup("main", dec!(10), 0.0)]);

        world.responder.execute_actions(&key("rif"), "TOPUP").unwrap();

        let account = world.account("rif");
        assert_balance_value(&account, MONETARY, "main", dec!(11));
        assert_eq!(account.balances(MONETARY).len(), 1);
    }

    #[test]
    fn test_unknown_action_set() {
        let world = ChargingWorld::new();

        let err = world.responder.execute_actions(&key("rif"), "NOWHERE").unwrap_err();

        assert!(err.is_not_found());
    }

    #[test]
    fn test_unknown_action_type() {
        let world = ChargingWorld::new();
        world.add_actions("ODD", vec![Action::new("*http_post")]);

        let err = world.responder.execute_actions(&key("rif"), "ODD").unwrap_err();

        assert!(matches!(err, ChargingError::UnknownActionType(_)));
    }

    #[test]
    fn test_custom_registry_handles_extra_action_type() {
        fn block(
            account: &mut Account,
            _: &Action,
            _: &[Action],
            _: &ChargingContext<'_>,
        ) -> Result<(), ChargingError> {
            account.disabled = true;
            Ok(())
        }

        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(1)).build());
        world.add_actions("ODD", vec![Action::new("*http_post")]);
        let mut registry = ActionRegistry::with_defaults();
        registry.register("*http_post", block);
        let responder = Responder::new(
            world.storage.clone(),
            world.rater.clone(),
            world.locker.clone(),
            world.config.clone(),
        )
        .with_actions(registry);

        responder.execute_actions(&key("rif"), "ODD").unwrap();

        assert!(world.account("rif").disabled);
    }

    #[test]
    fn test_failure_stops_batch_but_keeps_earlier_effects() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(1)).build());
        world.add_actions(
            "MIXED",
            vec![
                topup("late", dec!(1), 0.0),
                Action::new(action::REMOVE_BALANCE)
                    .with_balance(BalanceFilter {
                        id: Some("missing".to_string()),
                        ..BalanceFilter::of_type(MONETARY)
                    })
                    .with_weight(10.0),
                topup("early", dec!(1), 20.0),
            ],
        );

        let result = world.responder.execute_actions(&key("rif"), "MIXED");

        assert!(result.unwrap_err().is_not_found());
        let account = world.account("rif");
        assert_balance_value(&account, MONETARY, "early", dec!(1));
        assert!(account.balances(MONETARY).iter().all(|b| b.id != "late"));
    }

    #[test]
    fn test_relative_expiration_stamped_on_created_balance() {
        let world = ChargingWorld::new();
        let mut action = topup("promo", dec!(5), 0.0);
        action.expiration_string = "+30d".to_string();
        world.add_actions("PROMO", vec![action]);

        world.responder.execute_actions(&key("rif"), "PROMO").unwrap();

        let account = world.account("rif");
        let promo = account.balances(MONETARY).iter().find(|b| b.id == "promo").unwrap();
        let expires = promo.expiration_date.unwrap();
        assert!(expires > chrono::Utc::now() + Duration::days(29));
    }

    #[test]
    fn test_debit_action_creates_negative_default_balance() {
        let world = ChargingWorld::new();
        world.add_actions(
            "FEE",
            vec![Action::new(action::DEBIT).with_balance(BalanceFilter {
                id: Some("*default".to_string()),
                value: Some(dec!(2)),
                ..BalanceFilter::of_type(MONETARY)
            })],
        );

        world.responder.execute_actions(&key("rif"), "FEE").unwrap();

        assert_balance_value(&world.account("rif"), MONETARY, "*default", dec!(-2));
    }

    #[test]
    fn test_set_balance_overwrites_value() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(1)).build());
        world.add_actions(
            "RESET_MAIN",
            vec![Action::new(action::SET_BALANCE).with_balance(BalanceFilter {
                id: Some("main".to_string()),
                value: Some(dec!(25)),
                ..BalanceFilter::of_type(MONETARY)
            })],
        );

        world.responder.execute_actions(&key("rif"), "RESET_MAIN").unwrap();

        assert_balance_value(&world.account("rif"), MONETARY, "main", dec!(25));
    }

    #[test]
    fn test_disable_and_enable_balance() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").with_money("main", dec!(1)).build());
        let target = BalanceFilter {
            id: Some("main".to_string()),
            ..BalanceFilter::of_type(MONETARY)
        };
        world.add_actions("OFF", vec![Action::new(action::DISABLE_BALANCE).with_balance(target.clone())]);
        world.add_actions("ON", vec![Action::new(action::ENABLE_BALANCE).with_balance(target)]);

        world.responder.execute_actions(&key("rif"), "OFF").unwrap();
        assert!(world.account("rif").balances(MONETARY)[0].disabled);

        world.responder.execute_actions(&key("rif"), "ON").unwrap();
        assert!(!world.account("rif").balances(MONETARY)[0].disabled);
    }

    #[test]
    fn test_account_flags() {
        let world = ChargingWorld::new();
        world.add_account(TestAccountBuilder::new("rif").build());
        world.add_actions(
            "FLAGS",
            vec![Action::new(action::ALLOW_NEGATIVE), Action::new(action::DISABLE_ACCOUNT)],
        );

        world.responder.execute_actions(&key("rif"), "FLAGS").unwrap();

        let account = world.account("rif");
        assert!(account.allow_negative);
        assert!(account.disabled);
    }

    #[test]
    fn test_reset_account_zeroes_balances() {
        let world = ChargingWorld::new();
        world.add_account(
            TestAccountBuilder::new("rif")
                .with_money("main", dec!(7))
                .with_voice_seconds("minutes", 60)
                .build(),
        );
        world.add_actions("WIPE", vec![Action::new(action::RESET_ACCOUNT)]);

        world.responder.execute_actions(&key("rif"), "WIPE").unwrap();

        let account = world.account("rif");
        assert_balance_value(&account, MONETARY, "main", Decimal::ZERO);
        assert_balance_value(&account, VOICE, "minutes", Decimal::ZERO);
    }
}
