//! Storage-backed batch repository

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::batch::{Batch, BatchEvent, BatchRepository};
use crate::domain::collection::BatchId;
use crate::domain::collector::CollectorType;
use crate::domain::storage::Storage;
use crate::domain::DomainError;

/// Counter updates are read-modify-write, so they run under one lock
#[derive(Debug)]
pub struct StorageBatchRepository {
    storage: Arc<dyn Storage<Batch>>,
    write_lock: Mutex<()>,
}

impl StorageBatchRepository {
    pub fn new(storage: Arc<dyn Storage<Batch>>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self, id: &BatchId) -> Result<Batch, DomainError> {
        self.storage
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Batch '{}' not found", id)))
    }
}

#[async_trait]
impl BatchRepository for StorageBatchRepository {
    async fn create(&self, batch: Batch) -> Result<Batch, DomainError> {
        if self.storage.exists(batch.batch_id()).await? {
            return Err(DomainError::conflict(format!(
                "Batch '{}' already exists",
                batch.batch_id()
            )));
        }

        self.storage.create(batch).await
    }

    async fn get(&self, id: &BatchId) -> Result<Option<Batch>, DomainError> {
        self.storage.get(id).await
    }

    async fn record(
        &self,
        id: &BatchId,
        collector_type: &CollectorType,
        event: BatchEvent,
    ) -> Result<Batch, DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut batch = self.load(id).await?;

        if !batch.record(collector_type, event) {
            return Err(DomainError::validation(format!(
                "Batch '{}' has no collector type '{}'",
                id, collector_type
            )));
        }

        self.storage.update(batch).await
    }

    async fn cancel(&self, id: &BatchId) -> Result<Batch, DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut batch = self.load(id).await?;
        batch.cancel();
        self.storage.update(batch).await
    }
}
