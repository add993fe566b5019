//! Chain execution results

use thiserror::Error;

use crate::domain::attempt::ProviderAttempt;
use crate::domain::collection::{CollectorResult, CorrelationId};
use crate::domain::polling::PendingJob;
use crate::domain::DomainError;

/// A request either produced an answer or was handed to reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    Completed(CollectorResult),
    HandedOff(PendingJob),
}

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("all bindings exhausted for {request_id} after {} attempts", .attempts.len())]
    Exhausted {
        request_id: CorrelationId,
        attempts: Vec<ProviderAttempt>,
    },

    #[error("collection cancelled for {request_id} after {} attempts", .attempts.len())]
    Cancelled {
        request_id: CorrelationId,
        attempts: Vec<ProviderAttempt>,
    },

    #[error("failed to persist chain progress: {0}")]
    Persistence(#[from] DomainError),
}

impl ChainError {
    pub fn attempts(&self) -> &[ProviderAttempt] {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => attempts,
            Self::Persistence(_) => &[],
        }
    }
}

/// Result of resuming a handed-off job
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    Completed {
        result: CollectorResult,
        job: PendingJob,
    },
    /// Slice ran out with background budget left; the job stays handed off
    StillPending(PendingJob),
    Failed(PendingJob),
    TimedOut(PendingJob),
    /// The job had settled before this call; nothing was polled
    AlreadySettled(PendingJob),
}

impl ResumeOutcome {
    pub fn job(&self) -> &PendingJob {
        match self {
            Self::Completed { job, .. }
            | Self::StillPending(job)
            | Self::Failed(job)
            | Self::TimedOut(job)
            | Self::AlreadySettled(job) => job,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::StillPending(_) => "still_pending",
            Self::Failed(_) => "failed",
            Self::TimedOut(_) => "timed_out",
            Self::AlreadySettled(_) => "already_settled",
        }
    }
}
