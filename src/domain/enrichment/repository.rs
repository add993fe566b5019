use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::entity::{EnrichedRecord, EnrichmentTask, TaskKind};
use crate::domain::collection::CorrelationId;
use crate::domain::DomainError;

/// Enrichment persistence; every save is an upsert
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EnrichmentRepository: Send + Sync {
    async fn save_task(&self, task: &EnrichmentTask) -> Result<(), DomainError>;

    async fn get_task(
        &self,
        result_id: &CorrelationId,
        kind: TaskKind,
    ) -> Result<Option<EnrichmentTask>, DomainError>;

    async fn save_record(&self, record: &EnrichedRecord) -> Result<(), DomainError>;

    async fn get_record(
        &self,
        result_id: &CorrelationId,
    ) -> Result<Option<EnrichedRecord>, DomainError>;
}
