//! Storage-backed collector result repository

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::collection::{BatchId, CollectorResult, CollectorResultRepository, CorrelationId};
use crate::domain::storage::Storage;
use crate::domain::DomainError;

/// Results keyed by correlation id. A result is written once; saving the
/// same correlation id again returns the stored result unchanged.
#[derive(Debug)]
pub struct StorageCollectorResultRepository {
    storage: Arc<dyn Storage<CollectorResult>>,
}

impl StorageCollectorResultRepository {
    pub fn new(storage: Arc<dyn Storage<CollectorResult>>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CollectorResultRepository for StorageCollectorResultRepository {
    async fn save(&self, result: CollectorResult) -> Result<CollectorResult, DomainError> {
        if let Some(existing) = self.storage.get(result.request_id()).await? {
            debug!(request_id = %result.request_id(), "Result already stored");
            return Ok(existing);
        }

        self.storage.upsert(result).await
    }

    async fn get(&self, id: &CorrelationId) -> Result<Option<CollectorResult>, DomainError> {
        self.storage.get(id).await
    }

    async fn list_for_batch(&self, batch_id: &BatchId) -> Result<Vec<CollectorResult>, DomainError> {
        let mut results: Vec<CollectorResult> = self
            .storage
            .list()
            .await?
            .into_iter()
            .filter(|r| r.batch_id() == batch_id)
            .collect();
        results.sort_by(|a, b| a.request_id().as_str().cmp(b.request_id().as_str()));
        Ok(results)
    }
}
