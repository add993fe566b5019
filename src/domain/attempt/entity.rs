//! Provider attempt audit records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::collection::CorrelationId;
use crate::domain::storage::StorageEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Success,
    RetryableFailure,
    FatalFailure,
    RateLimited,
    AcceptedAsync,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::RetryableFailure => "retryable_failure",
            Self::FatalFailure => "fatal_failure",
            Self::RateLimited => "rate_limited",
            Self::AcceptedAsync => "accepted_async",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call to one provider on behalf of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    request_id: CorrelationId,
    sequence: u32,
    provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential_id: Option<String>,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ProviderAttempt {
    pub fn start(request_id: CorrelationId, sequence: u32, provider: impl Into<String>) -> Self {
        Self {
            request_id,
            sequence,
            provider: provider.into(),
            credential_id: None,
            started_at: Utc::now(),
            finished_at: None,
            status: AttemptStatus::Pending,
            response_payload: None,
            error: None,
        }
    }

    pub fn with_credential_id(mut self, id: impl Into<String>) -> Self {
        self.credential_id = Some(id.into());
        self
    }

    pub fn finish(mut self, status: AttemptStatus) -> Self {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.response_payload = Some(payload);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn request_id(&self) -> &CorrelationId {
        &self.request_id
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn credential_id(&self) -> Option<&str> {
        self.credential_id.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    pub fn response_payload(&self) -> Option<&serde_json::Value> {
        self.response_payload.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn duration(&self) -> Option<std::time::Duration> {
        self.finished_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }
}

/// All attempts of one request, in sequence order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptTrail {
    request_id: CorrelationId,
    attempts: Vec<ProviderAttempt>,
}

impl AttemptTrail {
    pub fn new(request_id: CorrelationId) -> Self {
        Self {
            request_id,
            attempts: Vec::new(),
        }
    }

    /// Appends, replacing an attempt already recorded under the same sequence
    pub fn push(&mut self, attempt: ProviderAttempt) {
        match self
            .attempts
            .iter_mut()
            .find(|a| a.sequence == attempt.sequence)
        {
            Some(existing) => *existing = attempt,
            None => {
                self.attempts.push(attempt);
                self.attempts.sort_by_key(|a| a.sequence);
            }
        }
    }

    pub fn attempts(&self) -> &[ProviderAttempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<ProviderAttempt> {
        self.attempts
    }
}

impl StorageEntity for AttemptTrail {
    type Key = CorrelationId;

    fn key(&self) -> &Self::Key {
        &self.request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::fixtures;

    #[test]
    fn test_attempt_lifecycle() {
        let request = fixtures::request("chat", 0);
        let attempt = ProviderAttempt::start(request.correlation_id().clone(), 0, "provider-x")
            .with_credential_id("k1");
        assert_eq!(attempt.status(), AttemptStatus::Pending);
        assert!(attempt.finished_at().is_none());

        let done = attempt
            .finish(AttemptStatus::RateLimited)
            .with_error("429 Too Many Requests");
        assert_eq!(done.status(), AttemptStatus::RateLimited);
        assert!(done.finished_at().is_some());
        assert_eq!(done.error(), Some("429 Too Many Requests"));
    }

    #[test]
    fn test_trail_keeps_sequence_order_and_is_idempotent() {
        let request = fixtures::request("chat", 0);
        let id = request.correlation_id().clone();
        let mut trail = AttemptTrail::new(id.clone());

        trail.push(ProviderAttempt::start(id.clone(), 1, "b").finish(AttemptStatus::Success));
        trail.push(ProviderAttempt::start(id.clone(), 0, "a").finish(AttemptStatus::FatalFailure));
        trail.push(ProviderAttempt::start(id.clone(), 1, "b").finish(AttemptStatus::Success));

        let providers: Vec<&str> = trail.attempts().iter().map(|a| a.provider()).collect();
        assert_eq!(providers, vec!["a", "b"]);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&AttemptStatus::AcceptedAsync).unwrap();
        assert_eq!(json, "\"accepted_async\"");
    }
}
