//! Provider domain - upstream answer APIs behind one adapter trait

mod adapter;
mod outcome;

pub use adapter::{ProviderAdapter, ProviderRegistry};
pub use outcome::{
    JobHandle, JobStatus, ProviderAnswer, ProviderError, ProviderQuery, Submission,
};

#[cfg(test)]
pub use adapter::mock;
