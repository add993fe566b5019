//! Poll state machine

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Accepted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    pub fn can_transition_to(&self, next: PollState) -> bool {
        match (self, next) {
            (Self::Accepted, Self::Polling) => true,
            (Self::Accepted, Self::TimedOut) => true,
            (Self::Polling, Self::Polling) => true,
            (Self::Polling, Self::Succeeded | Self::Failed | Self::TimedOut) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: PollState) -> Result<PollState, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::internal(format!(
                "invalid poll transition {:?} -> {:?}",
                self, next
            )))
        }
    }
}
