//! Collaborators handed to every account operation

use crate::config::ChargingConfig;
use crate::ports::{AccountingStorage, Guardian, RatingPort};
use crate::registry::ActionRegistry;

/// Borrowed collaborators of one charging operation
#[derive(Clone, Copy)]
pub struct ChargingContext<'a> {
    pub storage: &'a dyn AccountingStorage,
    pub rater: &'a dyn RatingPort,
    pub guardian: &'a dyn Guardian,
    pub actions: &'a ActionRegistry,
    pub config: &'a ChargingConfig,
}

impl<'a> ChargingContext<'a> {
    pub fn new(
        storage: &'a dyn AccountingStorage,
        rater: &'a dyn RatingPort,
        guardian: &'a dyn Guardian,
        actions: &'a ActionRegistry,
        config: &'a ChargingConfig,
    ) -> Self {
        Self {
            storage,
            rater,
            guardian,
            actions,
            config,
        }
    }
}
