//! Attempt domain - append-only audit trail of provider calls

mod entity;
mod repository;

pub use entity::{AttemptStatus, AttemptTrail, ProviderAttempt};
pub use repository::AttemptLog;

#[cfg(test)]
pub use repository::MockAttemptLog;
