//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for balances and call costs that
//! give more meaningful error messages than standard assertions.

use chrono::Duration;
use domain_charging::{Account, CallCost};
use rust_decimal::Decimal;

/// Asserts the value of the balance with `id` in the `balance_type` chain
///
/// # Panics
///
/// Panics if the balance does not exist or holds another value
pub fn assert_balance_value(account: &Account, balance_type: &str, id: &str, expected: Decimal) {
    let balance = account
        .balances(balance_type)
        .iter()
        .find(|b| b.id == id)
        .unwrap_or_else(|| panic!("Balance {} of type {} not found on {}", id, balance_type, account.id));
    assert_eq!(
        balance.value(),
        expected,
        "Balance {} of {} holds {}, expected {}",
        id,
        account.id,
        balance.value(),
        expected
    );
}

/// Asserts that no balance of the account is below zero
pub fn assert_no_negative_balances(account: &Account) {
    for (balance_type, balances) in &account.balance_map {
        for balance in balances {
            assert!(
                balance.value() >= Decimal::ZERO,
                "Balance {} ({}) of {} went negative: {}",
                balance.id,
                balance_type,
                account.id,
                balance.value()
            );
        }
    }
}

/// Asserts that every increment of the result is paid and stamped with a
/// paying account
pub fn assert_fully_paid(cc: &CallCost) {
    for (index, inc) in cc.increments().enumerate() {
        assert!(inc.is_paid(), "Increment {} is not paid", index);
        assert!(
            inc.balance_info.account_id.is_some(),
            "Increment {} carries no paying account",
            index
        );
    }
}

/// Asserts the usage covered by the result
pub fn assert_covers(cc: &CallCost, expected: Duration) {
    assert_eq!(
        cc.duration(),
        expected,
        "Call cost covers {}s, expected {}s",
        cc.duration().num_seconds(),
        expected.num_seconds()
    );
}
