// In crates/readiness/src/state.rs

use crate::error::{Error, Result};
use crate::types::ReadinessStatus;

impl ReadinessStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReadinessStatus::Evaluating)
    }

    pub fn can_transition_to(&self, next: ReadinessStatus) -> bool {
        matches!(self, ReadinessStatus::Evaluating) && next.is_terminal()
    }

    /// Moves to `next`, refusing anything but `Evaluating` -> verdict.
    pub fn transition(self, next: ReadinessStatus) -> Result<ReadinessStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}
