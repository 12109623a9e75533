//! Action dispatch table

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::account::Account;
use crate::action::{self, Action, ActionHandler};
use crate::context::ChargingContext;
use crate::error::ChargingError;

/// Built-in handlers, shared by every responder that does not bring its own
pub static DEFAULT_ACTIONS: Lazy<ActionRegistry> = Lazy::new(ActionRegistry::with_defaults);

/// Maps action tags to handlers
///
/// New action types are added with [`ActionRegistry::register`]; the debit
/// engine and trigger executor only ever dispatch through this table.
#[derive(Clone)]
pub struct ActionRegistry {
    handlers: HashMap<String, ActionHandler>,
}

impl ActionRegistry {
    /// A registry without any handler
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry holding every built-in action
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(action::TOPUP, action::topup);
        registry.register(action::TOPUP_RESET, action::topup_reset);
        registry.register(action::DEBIT, action::debit);
        registry.register(action::DEBIT_RESET, action::debit_reset);
        registry.register(action::SET_BALANCE, action::set_balance);
        registry.register(action::REMOVE_BALANCE, action::remove_balance);
        registry.register(action::ENABLE_BALANCE, action::enable_balance);
        registry.register(action::DISABLE_BALANCE, action::disable_balance);
        registry.register(action::RESET_TRIGGERS, action::reset_triggers);
        registry.register(action::SET_RECURRENT, action::set_recurrent);
        registry.register(action::UNSET_RECURRENT, action::unset_recurrent);
        registry.register(action::ALLOW_NEGATIVE, action::allow_negative);
        registry.register(action::DENY_NEGATIVE, action::deny_negative);
        registry.register(action::ENABLE_ACCOUNT, action::enable_account);
        registry.register(action::DISABLE_ACCOUNT, action::disable_account);
        registry.register(action::RESET_COUNTERS, action::reset_counters);
        registry.register(action::RESET_ACCOUNT, action::reset_account);
        registry.register(action::LOG, action::log);
        registry
    }

    /// Registers `handler` under `tag`, returning the handler it replaced
    pub fn register(&mut self, tag: impl Into<String>, handler: ActionHandler) -> Option<ActionHandler> {
        self.handlers.insert(tag.into(), handler)
    }

    pub fn get(&self, tag: &str) -> Option<ActionHandler> {
        self.handlers.get(tag).copied()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Registered tags in sorted order
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Runs the handler registered for the action's tag
    pub fn execute(
        &self,
        account: &mut Account,
        action: &Action,
        batch: &[Action],
        ctx: &ChargingContext<'_>,
    ) -> Result<(), ChargingError> {
        let handler = self
            .get(&action.action_type)
            .ok_or_else(|| ChargingError::UnknownActionType(action.action_type.clone()))?;
        handler(account, action, batch, ctx)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry").field("tags", &self.tags()).finish()
    }
}
