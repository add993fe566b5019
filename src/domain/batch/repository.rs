//! Batch repository trait

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::{Batch, BatchEvent};
use crate::domain::collection::BatchId;
use crate::domain::collector::CollectorType;
use crate::domain::error::DomainError;

/// Persistence for batches.
///
/// `record` and `cancel` are read-modify-write operations; implementations
/// must not lose concurrent updates to the same batch.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn create(&self, batch: Batch) -> Result<Batch, DomainError>;

    async fn get(&self, id: &BatchId) -> Result<Option<Batch>, DomainError>;

    async fn record(
        &self,
        id: &BatchId,
        collector_type: &CollectorType,
        event: BatchEvent,
    ) -> Result<Batch, DomainError>;

    async fn cancel(&self, id: &BatchId) -> Result<Batch, DomainError>;
}
