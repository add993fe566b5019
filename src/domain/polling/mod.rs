//! Polling domain - async job sub-engine and handed-off jobs

mod config;
mod pending;
mod poller;
mod state;

pub use config::{PollTier, PollingConfig};
pub use pending::{PendingJob, PendingJobRepository, PendingJobStatus};
pub use poller::{AsyncPoller, PollOutcome, PollRun};
pub use state::PollState;

#[cfg(test)]
pub use pending::MockPendingJobRepository;
