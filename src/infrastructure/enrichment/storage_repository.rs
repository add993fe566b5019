//! Storage-backed enrichment repository

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::collection::CorrelationId;
use crate::domain::enrichment::{EnrichedRecord, EnrichmentRepository, EnrichmentTask, TaskKind};
use crate::domain::storage::Storage;
use crate::domain::DomainError;

#[derive(Debug)]
pub struct StorageEnrichmentRepository {
    tasks: Arc<dyn Storage<EnrichmentTask>>,
    records: Arc<dyn Storage<EnrichedRecord>>,
}

impl StorageEnrichmentRepository {
    pub fn new(
        tasks: Arc<dyn Storage<EnrichmentTask>>,
        records: Arc<dyn Storage<EnrichedRecord>>,
    ) -> Self {
        Self { tasks, records }
    }
}

#[async_trait]
impl EnrichmentRepository for StorageEnrichmentRepository {
    async fn save_task(&self, task: &EnrichmentTask) -> Result<(), DomainError> {
        self.tasks.upsert(task.clone()).await?;
        Ok(())
    }

    async fn get_task(
        &self,
        result_id: &CorrelationId,
        kind: TaskKind,
    ) -> Result<Option<EnrichmentTask>, DomainError> {
        self.tasks
            .get(&EnrichmentTask::key_for(result_id, kind))
            .await
    }

    async fn save_record(&self, record: &EnrichedRecord) -> Result<(), DomainError> {
        self.records.upsert(record.clone()).await?;
        Ok(())
    }

    async fn get_record(
        &self,
        result_id: &CorrelationId,
    ) -> Result<Option<EnrichedRecord>, DomainError> {
        self.records.get(result_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::fixtures;
    use crate::domain::enrichment::{EnrichmentPayload, SentimentScore, TaskStatus};
    use crate::infrastructure::storage::InMemoryStorage;

    fn repository() -> StorageEnrichmentRepository {
        StorageEnrichmentRepository::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(InMemoryStorage::new()),
        )
    }

    #[tokio::test]
    async fn test_task_saves_are_upserts() {
        let repo = repository();
        let result_id = fixtures::request("chat", 0).correlation_id().clone();

        let mut task = EnrichmentTask::pending(result_id.clone(), TaskKind::Sentiment);
        repo.save_task(&task).await.unwrap();
        task.start().unwrap();
        repo.save_task(&task).await.unwrap();
        task.succeed(
            "lexicon",
            EnrichmentPayload::Sentiment(SentimentScore::from_score(0.5)),
        )
        .unwrap();
        repo.save_task(&task).await.unwrap();
        repo.save_task(&task).await.unwrap();

        let stored = repo
            .get_task(&result_id, TaskKind::Sentiment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), TaskStatus::Succeeded);
        assert_eq!(stored.provider_used(), Some("lexicon"));
        assert!(repo
            .get_task(&result_id, TaskKind::Position)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let repo = repository();
        let result_id = fixtures::request("chat", 1).correlation_id().clone();

        let record = EnrichedRecord::merge(result_id.clone(), std::iter::empty::<&EnrichmentTask>());
        repo.save_record(&record).await.unwrap();
        repo.save_record(&record).await.unwrap();

        let stored = repo.get_record(&result_id).await.unwrap().unwrap();
        assert_eq!(stored.result_id(), &result_id);
        assert!(stored.sentiment.is_none());
    }
}
