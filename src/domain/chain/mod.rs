//! Chain domain - provider fallback execution for collection requests

mod executor;
mod outcome;
mod retry;

pub use executor::ChainExecutor;
pub use outcome::{ChainError, ChainOutcome, ResumeOutcome};
pub use retry::RetryConfig;
