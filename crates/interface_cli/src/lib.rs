//! Command-line front end of the charging engine
//!
//! Loads a JSON scenario into the in-memory adapters and replays its
//! requests through a [`domain_charging::Responder`]:
//!
//! ```json
//! {
//!   "Store": { "Accounts": [..], "SharedGroups": [..], "Destinations": {..}, "Actions": {..} },
//!   "RatePlans": [ { "Prefix": "", "Rate": 0.6, "RateUnit": 60000000000, "RateIncrement": 1000000000 } ],
//!   "Requests": [ { "Debit": { "Tenant": "cgrates.org", "Account": "alice", .. } } ]
//! }
//! ```
//!
//! Each request produces one [`Outcome`]. `MaxUsage` reports `-1` for
//! accounts allowed to go negative.

pub mod config;
pub mod scenario;

pub use config::{AppConfig, LogFormat};
pub use scenario::{Outcome, Request, Scenario, ScenarioError, ScenarioRunner};
