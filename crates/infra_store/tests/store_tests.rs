//! Tests for the in-memory adapters wired behind a responder

use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;

use core_kernel::AccountKey;
use domain_charging::constants::MONETARY;
use domain_charging::{AccountingStorage, CallDescriptor, ChargingConfig, Guardian, Responder, SharingStrategy};
use infra_store::{FlatRateRater, InMemoryStorage, NamedLocker, RatePlan};

const SNAPSHOT: &str = r#"{
    "Accounts": [
        {
            "ID": "cgrates.org:alice",
            "BalanceMap": {
                "*monetary": [
                    { "ID": "pool", "Value": 0, "SharedGroups": { "FAMILY": true } }
                ]
            }
        },
        {
            "ID": "cgrates.org:bob",
            "BalanceMap": {
                "*monetary": [
                    { "ID": "pool", "Value": 20, "SharedGroups": { "FAMILY": true } },
                    { "ID": "intl", "Value": 5, "Weight": 10, "DestinationIDs": { "DST_INTL": true } }
                ]
            }
        }
    ],
    "SharedGroups": [
        {
            "ID": "FAMILY",
            "AccountParameters": { "*any": { "Strategy": "*highest" } },
            "MemberIDs": ["cgrates.org:alice", "cgrates.org:bob"]
        }
    ],
    "Destinations": { "DST_INTL": ["00"] },
    "Actions": {
        "TOPUP_10": [
            { "ActionType": "*topup", "Balance": { "ID": "pool", "Type": "*monetary", "Value": 10 } }
        ]
    }
}"#;

fn key(name: &str) -> AccountKey {
    AccountKey::new("cgrates.org", name)
}

fn call(account: &str, destination: &str, seconds: i64) -> CallDescriptor {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    CallDescriptor::new("cgrates.org", account, destination, start, start + Duration::seconds(seconds))
}

fn responder(storage: Arc<InMemoryStorage>) -> Responder {
    let rater = Arc::new(FlatRateRater::from_plans([RatePlan::per_minute("", dec!(0.6), 1)]));
    Responder::new(storage, rater, Arc::new(NamedLocker::new()), ChargingConfig::default())
}

// ============================================================================
// Snapshot Tests
// ============================================================================

mod snapshot_tests {
    use super::*;

    #[test]
    fn test_load_snapshot() {
        let store = InMemoryStorage::from_json(SNAPSHOT).unwrap();

        assert_eq!(store.account_count(), 2);
        let bob = store.get_account(&key("bob")).unwrap();
        assert_eq!(bob.balances(MONETARY).len(), 2);
        assert_eq!(bob.total_value(MONETARY), dec!(25));
        let group = store.get_shared_group("FAMILY", false).unwrap();
        assert_eq!(group.strategy_for(&key("alice")), SharingStrategy::Highest);
        assert_eq!(store.get_reverse_destination("00").unwrap(), vec!["DST_INTL".to_string()]);
        assert_eq!(store.get_actions("TOPUP_10").unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip_keeps_content() {
        let store = InMemoryStorage::from_json(SNAPSHOT).unwrap();
        let snapshot = store.snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        let reloaded = InMemoryStorage::from_json(&json).unwrap();

        assert_eq!(reloaded.snapshot(), snapshot);
    }

    #[test]
    fn test_snapshot_rejects_account_without_id() {
        let err = InMemoryStorage::from_json(r#"{ "Accounts": [ { "ID": "" } ] }"#);

        assert!(err.is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(InMemoryStorage::from_json("{ not json").is_err());
    }
}

// ============================================================================
// Wiring Tests
// ============================================================================

mod wiring_tests {
    use super::*;

    #[test]
    fn test_shared_group_debit_from_snapshot() {
        let storage = Arc::new(InMemoryStorage::from_json(SNAPSHOT).unwrap());
        let responder = responder(storage.clone());

        let cc = responder.debit(&call("alice", "0723", 100)).unwrap();

        assert_eq!(cc.cost, dec!(1));
        let bob = storage.get_account(&key("bob")).unwrap();
        let pool = bob.balances(MONETARY).iter().find(|b| b.id == "pool").unwrap();
        assert_eq!(pool.value(), dec!(19));
    }

    #[test]
    fn test_destination_restricted_balance_only_for_its_destination() {
        let storage = Arc::new(InMemoryStorage::from_json(SNAPSHOT).unwrap());
        let responder = responder(storage.clone());

        responder.debit(&call("bob", "0049123", 100)).unwrap();

        let bob = storage.get_account(&key("bob")).unwrap();
        let intl = bob.balances(MONETARY).iter().find(|b| b.id == "intl").unwrap();
        assert_eq!(intl.value(), dec!(4));
    }

    #[test]
    fn test_counter_trigger_from_snapshot_fires() {
        let json = r#"{
            "Accounts": [
                {
                    "ID": "cgrates.org:dave",
                    "BalanceMap": { "*monetary": [ { "ID": "main", "Value": 10 } ] },
                    "ActionTriggers": [
                        {
                            "UniqueID": "SPEND",
                            "ThresholdType": "*max_balance_counter",
                            "ThresholdValue": 0.5,
                            "Balance": { "Type": "*monetary" },
                            "ActionsID": "LOG"
                        }
                    ]
                }
            ],
            "Actions": { "LOG": [ { "ActionType": "*log" } ] }
        }"#;
        let storage = Arc::new(InMemoryStorage::from_json(json).unwrap());
        assert!(!storage.get_account(&key("dave")).unwrap().unit_counters.is_empty());
        let responder = responder(storage.clone());

        responder.debit(&call("dave", "0723", 60)).unwrap();

        let dave = storage.get_account(&key("dave")).unwrap();
        assert_eq!(dave.total_value(MONETARY), dec!(9.4));
        assert!(dave.action_triggers[0].executed);
    }

    #[test]
    fn test_actions_from_snapshot() {
        let storage = Arc::new(InMemoryStorage::from_json(SNAPSHOT).unwrap());
        let responder = responder(storage.clone());

        responder.execute_actions(&key("alice"), "TOPUP_10").unwrap();

        let alice = storage.get_account(&key("alice")).unwrap();
        assert_eq!(alice.total_value(MONETARY), dec!(10));
    }

    #[test]
    fn test_concurrent_debits_are_serialized() {
        let storage = Arc::new(InMemoryStorage::from_json(SNAPSHOT).unwrap());
        let responder = Arc::new(responder(storage.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let responder = responder.clone();
                thread::spawn(move || responder.debit(&call("alice", "0723", 10)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let bob = storage.get_account(&key("bob")).unwrap();
        let pool = bob.balances(MONETARY).iter().find(|b| b.id == "pool").unwrap();
        assert_eq!(pool.value(), dec!(19.2));
    }

    #[test]
    fn test_locker_guards_named_resources() {
        let locker = NamedLocker::new();
        let names = vec!["cgrates.org:alice".to_string()];

        let value = locker.guard(&names, std::time::Duration::from_millis(50), &mut || {
            assert!(locker.is_held("cgrates.org:alice"));
            Ok(())
        });

        assert!(value.is_ok());
        assert!(!locker.is_held("cgrates.org:alice"));
    }
}
