//! Attempt audit log trait

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::ProviderAttempt;
use crate::domain::collection::CorrelationId;
use crate::domain::error::DomainError;

/// Append-only audit trail of provider attempts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AttemptLog: Send + Sync {
    /// Records an attempt as soon as it has an outcome
    async fn append(&self, attempt: ProviderAttempt) -> Result<(), DomainError>;

    async fn list_for_request(
        &self,
        request_id: &CorrelationId,
    ) -> Result<Vec<ProviderAttempt>, DomainError>;
}
