//! Jobs handed off to background reconciliation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::domain::collection::CollectionRequest;
use crate::domain::error::DomainError;
use crate::domain::provider::JobHandle;
use crate::domain::storage::{StorageEntity, StorageKey};

impl StorageKey for JobHandle {
    fn as_str(&self) -> &str {
        JobHandle::as_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingJobStatus {
    HandedOff,
    Succeeded,
    Failed,
    TimedOut,
}

impl PendingJobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::HandedOff)
    }
}

/// An accepted job the interactive tier stopped waiting for.
///
/// Resuming polls `job_handle` again; the original request is kept only to
/// build the result and is never re-submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingJob {
    job_handle: JobHandle,
    provider: String,
    credential_id: String,
    request: CollectionRequest,
    accepted_at: DateTime<Utc>,
    /// Sequence number for the next attempt appended on resume
    next_attempt_sequence: u32,
    status: PendingJobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_polled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl PendingJob {
    pub fn new(
        job_handle: JobHandle,
        provider: impl Into<String>,
        credential_id: impl Into<String>,
        request: CollectionRequest,
        accepted_at: DateTime<Utc>,
        next_attempt_sequence: u32,
    ) -> Self {
        Self {
            job_handle,
            provider: provider.into(),
            credential_id: credential_id.into(),
            request,
            accepted_at,
            next_attempt_sequence,
            status: PendingJobStatus::HandedOff,
            last_polled_at: None,
            error: None,
        }
    }

    pub fn job_handle(&self) -> &JobHandle {
        &self.job_handle
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }

    pub fn request(&self) -> &CollectionRequest {
        &self.request
    }

    pub fn accepted_at(&self) -> DateTime<Utc> {
        self.accepted_at
    }

    pub fn next_attempt_sequence(&self) -> u32 {
        self.next_attempt_sequence
    }

    pub fn status(&self) -> PendingJobStatus {
        self.status
    }

    pub fn last_polled_at(&self) -> Option<DateTime<Utc>> {
        self.last_polled_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Time since the provider accepted the job
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.accepted_at).to_std().unwrap_or_default()
    }

    /// Records a resume that left the job unsettled
    pub fn mark_polled(&mut self) {
        self.last_polled_at = Some(Utc::now());
    }

    pub fn settle(&mut self, status: PendingJobStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.last_polled_at = Some(Utc::now());
        self.next_attempt_sequence += 1;
    }
}

impl StorageEntity for PendingJob {
    type Key = JobHandle;

    fn key(&self) -> &Self::Key {
        &self.job_handle
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PendingJobRepository: Send + Sync {
    async fn save(&self, job: PendingJob) -> Result<PendingJob, DomainError>;

    async fn get(&self, handle: &JobHandle) -> Result<Option<PendingJob>, DomainError>;

    /// Jobs still waiting for reconciliation, oldest first
    async fn list_handed_off(&self) -> Result<Vec<PendingJob>, DomainError>;
}
