//! JSON scenarios: a store snapshot, the tariffs to rate with and the
//! requests to run against them

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use core_kernel::AccountKey;
use domain_charging::{CallCost, CallDescriptor, ChargingConfig, ChargingError, Responder};
use infra_store::{FlatRateRater, InMemoryStorage, NamedLocker, RatePlan, StoreError, StoreSnapshot};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Malformed scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single engine request
///
/// Externally tagged: `{"Debit": { ..call descriptor.. }}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    GetCost(CallDescriptor),
    Debit(CallDescriptor),
    MaxDebit(CallDescriptor),
    MaxUsage(CallDescriptor),
    /// The descriptor's `Increments` name what to give back
    Refund(CallDescriptor),
    #[serde(rename_all = "PascalCase")]
    ExecuteActions {
        account: AccountKey,
        actions_id: String,
    },
}

impl Request {
    fn name(&self) -> &'static str {
        match self {
            Request::GetCost(_) => "get_cost",
            Request::Debit(_) => "debit",
            Request::MaxDebit(_) => "max_debit",
            Request::MaxUsage(_) => "max_usage",
            Request::Refund(_) => "refund",
            Request::ExecuteActions { .. } => "execute_actions",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Scenario {
    pub store: StoreSnapshot,
    pub rate_plans: Vec<RatePlan>,
    pub requests: Vec<Request>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Result of one request, printed as one JSON line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Outcome {
    pub request: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CallCost>,
    /// Usage allowed in seconds, `-1` when unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_usage_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    fn done(request: &'static str) -> Self {
        Self {
            request,
            cost: None,
            max_usage_secs: None,
            error: None,
        }
    }

    fn failed(request: &'static str, err: &ChargingError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::done(request)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Cost of the outcome, zero when it carries none
    pub fn total_cost(&self) -> Decimal {
        self.cost.as_ref().map(|cc| cc.cost).unwrap_or(Decimal::ZERO)
    }
}

/// A loaded scenario wired to the in-memory adapters
pub struct ScenarioRunner {
    storage: Arc<InMemoryStorage>,
    responder: Responder,
    requests: Vec<Request>,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario, config: ChargingConfig) -> Result<Self, ScenarioError> {
        let storage = Arc::new(InMemoryStorage::from_snapshot(scenario.store)?);
        let rater = Arc::new(FlatRateRater::from_plans(scenario.rate_plans));
        let responder = Responder::new(storage.clone(), rater, Arc::new(NamedLocker::new()), config);
        Ok(Self {
            storage,
            responder,
            requests: scenario.requests,
        })
    }

    /// Runs every request in order; a failed request is reported and the
    /// run goes on
    #[instrument(skip(self), fields(requests = self.requests.len()))]
    pub fn run(&self) -> Vec<Outcome> {
        self.requests.iter().map(|request| self.run_one(request)).collect()
    }

    fn run_one(&self, request: &Request) -> Outcome {
        let name = request.name();
        let result = match request {
            Request::GetCost(cd) => self.responder.get_cost(cd).map(|cc| with_cost(name, cc)),
            Request::Debit(cd) => self.responder.debit(cd).map(|cc| with_cost(name, cc)),
            Request::MaxDebit(cd) => self.responder.max_debit(cd).map(|cc| with_cost(name, cc)),
            Request::MaxUsage(cd) => self.responder.max_session_duration(cd).map(|limit| Outcome {
                max_usage_secs: Some(limit.map(|d| d.num_seconds()).unwrap_or(-1)),
                ..Outcome::done(name)
            }),
            Request::Refund(cd) => self.responder.refund_increments(cd).map(|_| Outcome::done(name)),
            Request::ExecuteActions { account, actions_id } => self
                .responder
                .execute_actions(account, actions_id)
                .map(|_| Outcome::done(name)),
        };
        match result {
            Ok(outcome) => {
                info!(request = name, "Request completed");
                outcome
            }
            Err(err) => {
                warn!(request = name, error = %err, "Request failed");
                Outcome::failed(name, &err)
            }
        }
    }

    /// The store as it stands after the run
    pub fn snapshot(&self) -> StoreSnapshot {
        self.storage.snapshot()
    }
}

fn with_cost(request: &'static str, cc: CallCost) -> Outcome {
    Outcome {
        cost: Some(cc),
        ..Outcome::done(request)
    }
}
