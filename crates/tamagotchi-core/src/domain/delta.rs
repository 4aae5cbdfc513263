//! Health deltas: the outcome of evaluating one snapshot.

use serde::{Deserialize, Serialize};
use tamagotchi_state::{CiStatus, EventTag};

/// Adjustment produced by one evaluation, applied atomically to a pet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthDelta {
    /// Signed happiness adjustment (before clamping)
    pub happiness: i32,
    /// Signed hunger adjustment (before clamping)
    pub hunger: i32,
    /// New sickness flag, only when it differs from the current one
    pub sickness: Option<bool>,
    /// CI status to remember as last observed, when the snapshot knew it
    pub ci_observed: Option<CiStatus>,
    /// A merge to main fed the pet
    pub fed: bool,
    /// Triggered events in rule order, without duplicates
    pub events: Vec<EventTag>,
}

impl HealthDelta {
    /// No adjustment and no event.
    pub fn is_zero(&self) -> bool {
        self.happiness == 0
            && self.hunger == 0
            && self.sickness.is_none()
            && !self.fed
            && self.events.is_empty()
    }

    pub fn has_event(&self, tag: EventTag) -> bool {
        self.events.contains(&tag)
    }

    pub(crate) fn push_event(&mut self, tag: EventTag) {
        if !self.events.contains(&tag) {
            self.events.push(tag);
        }
    }
}
