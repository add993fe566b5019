//! Collector result repository trait

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::{BatchId, CollectorResult, CorrelationId};
use crate::domain::error::DomainError;

/// Persistence for collected answers.
///
/// `save` is an upsert by correlation id: saving the same result twice
/// stores it once.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CollectorResultRepository: Send + Sync {
    async fn save(&self, result: CollectorResult) -> Result<CollectorResult, DomainError>;

    async fn get(&self, id: &CorrelationId) -> Result<Option<CollectorResult>, DomainError>;

    async fn list_for_batch(&self, batch_id: &BatchId)
        -> Result<Vec<CollectorResult>, DomainError>;
}
