//! Collection service - the entry point shared by the HTTP API, the CLI and
//! the reconciliation sweeper

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::batch::{Batch, BatchRepository};
use crate::domain::chain::ResumeOutcome;
use crate::domain::collection::{BatchId, CollectorResult, CollectorResultRepository, CorrelationId};
use crate::domain::enrichment::{EnrichedRecord, EnrichmentRepository, TaskKind};
use crate::domain::error::DomainError;
use crate::domain::orchestrator::{BatchSpec, CollectionOrchestrator, CollectionOutcome};
use crate::domain::polling::PendingJob;
use crate::domain::provider::JobHandle;
use crate::infrastructure::observability::{
    record_chain_outcome, record_enrichment, record_handoff_resolution,
};

/// A collected result with whatever enrichment has been stored for it
#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub result: CollectorResult,
    pub enrichment: Option<EnrichedRecord>,
}

/// What one resume call did to a handed-off job
#[derive(Debug, Clone, Serialize)]
pub struct ResumeReport {
    pub outcome: &'static str,
    pub job: PendingJob,
    /// Set when the job settled during this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionOutcome>,
}

/// Trait for the collection service (for dynamic dispatch in AppState)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CollectionServiceTrait: Send + Sync + Debug {
    /// Registers a batch and returns its outcome stream. Nothing runs
    /// until the stream is polled.
    async fn start(
        &self,
        spec: BatchSpec,
    ) -> Result<(Batch, BoxStream<'static, CollectionOutcome>), DomainError>;

    /// Registers a batch and runs it in the background
    async fn submit(&self, spec: BatchSpec) -> Result<Batch, DomainError>;

    async fn progress(&self, batch_id: &BatchId) -> Result<Batch, DomainError>;

    /// Stops new provider attempts for the batch
    async fn cancel(&self, batch_id: &BatchId) -> Result<Batch, DomainError>;

    /// Polls a handed-off job once more; never re-submits the query
    async fn resume_polling(&self, handle: &JobHandle) -> Result<ResumeReport, DomainError>;

    async fn result(&self, id: &CorrelationId) -> Result<ResultView, DomainError>;

    /// Cancels every running batch
    fn shutdown(&self);
}

type TokenMap = Arc<Mutex<HashMap<BatchId, CancellationToken>>>;

fn lock(tokens: &TokenMap) -> MutexGuard<'_, HashMap<BatchId, CancellationToken>> {
    tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drops a batch's cancellation token once its stream is gone
struct TokenGuard {
    tokens: TokenMap,
    batch_id: BatchId,
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        lock(&self.tokens).remove(&self.batch_id);
    }
}

fn record_outcome(outcome: &CollectionOutcome) {
    record_chain_outcome(outcome.request_id().collector_type(), outcome.label());

    if let CollectionOutcome::Completed {
        enrichment: Some(record),
        ..
    } = outcome
    {
        record_enrichment_fields(record);
    }
}

fn record_enrichment_fields(record: &EnrichedRecord) {
    for (kind, present) in [
        (TaskKind::Position, record.position.is_some()),
        (TaskKind::Sentiment, record.sentiment.is_some()),
        (TaskKind::Citation, record.citations.is_some()),
    ] {
        let status = if present { "succeeded" } else { "failed" };
        record_enrichment(kind.as_str(), status, None);
    }
}

pub struct CollectionService {
    orchestrator: Arc<CollectionOrchestrator>,
    results: Arc<dyn CollectorResultRepository>,
    enrichment: Arc<dyn EnrichmentRepository>,
    batches: Arc<dyn BatchRepository>,
    tokens: TokenMap,
    root: CancellationToken,
}

impl CollectionService {
    pub fn new(
        orchestrator: Arc<CollectionOrchestrator>,
        results: Arc<dyn CollectorResultRepository>,
        enrichment: Arc<dyn EnrichmentRepository>,
        batches: Arc<dyn BatchRepository>,
    ) -> Self {
        Self {
            orchestrator,
            results,
            enrichment,
            batches,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            root: CancellationToken::new(),
        }
    }

    pub fn running_batches(&self) -> usize {
        lock(&self.tokens).len()
    }
}

impl Debug for CollectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionService")
            .field("orchestrator", &self.orchestrator)
            .field("running_batches", &self.running_batches())
            .finish()
    }
}

#[async_trait]
impl CollectionServiceTrait for CollectionService {
    #[instrument(skip_all, fields(brand_id = %spec.brand_id))]
    async fn start(
        &self,
        spec: BatchSpec,
    ) -> Result<(Batch, BoxStream<'static, CollectionOutcome>), DomainError> {
        let prepared = self.orchestrator.prepare(&spec).await?;
        let batch_id = prepared.batch_id().clone();

        let batch = self
            .batches
            .get(&batch_id)
            .await?
            .ok_or_else(|| DomainError::internal(format!("Batch '{}' vanished", batch_id)))?;

        let token = self.root.child_token();
        lock(&self.tokens).insert(batch_id.clone(), token.clone());
        let guard = TokenGuard {
            tokens: self.tokens.clone(),
            batch_id: batch_id.clone(),
        };

        // The guard goes away with the stream, consumed or not
        let release = stream::once(async move {
            drop(guard);
            None
        })
        .filter_map(future::ready);

        let outcomes = self
            .orchestrator
            .clone()
            .collect(prepared, token)
            .inspect(record_outcome)
            .chain(release)
            .boxed();

        info!(batch_id = %batch_id, requests = batch.totals().total, "Batch started");
        Ok((batch, outcomes))
    }

    async fn submit(&self, spec: BatchSpec) -> Result<Batch, DomainError> {
        let (batch, outcomes) = self.start(spec).await?;
        let batch_id = batch.batch_id().clone();

        tokio::spawn(async move {
            let settled = outcomes.count().await;
            info!(batch_id = %batch_id, settled, "Batch stream finished");
        });

        Ok(batch)
    }

    #[instrument(skip(self))]
    async fn progress(&self, batch_id: &BatchId) -> Result<Batch, DomainError> {
        self.batches
            .get(batch_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Batch '{}' not found", batch_id)))
    }

    #[instrument(skip(self))]
    async fn cancel(&self, batch_id: &BatchId) -> Result<Batch, DomainError> {
        let batch = self.batches.cancel(batch_id).await?;

        match lock(&self.tokens).get(batch_id) {
            Some(token) => token.cancel(),
            None => warn!(batch_id = %batch_id, "Cancelled batch has no running stream"),
        }

        info!(batch_id = %batch_id, "Batch cancelled");
        Ok(batch)
    }

    #[instrument(skip(self))]
    async fn resume_polling(&self, handle: &JobHandle) -> Result<ResumeReport, DomainError> {
        let outcome = self.orchestrator.executor().resume(handle).await?;

        if matches!(
            outcome,
            ResumeOutcome::Completed { .. } | ResumeOutcome::Failed(_) | ResumeOutcome::TimedOut(_)
        ) {
            record_handoff_resolution(outcome.job().provider(), outcome.label());
        }

        let collection = self.orchestrator.settle_handoff(&outcome).await;
        if let Some(CollectionOutcome::Completed {
            enrichment: Some(record),
            ..
        }) = &collection
        {
            record_enrichment_fields(record);
        }

        Ok(ResumeReport {
            outcome: outcome.label(),
            job: outcome.job().clone(),
            collection,
        })
    }

    #[instrument(skip(self))]
    async fn result(&self, id: &CorrelationId) -> Result<ResultView, DomainError> {
        let result = self
            .results
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Result '{}' not found", id)))?;
        let enrichment = self.enrichment.get_record(id).await?;

        Ok(ResultView { result, enrichment })
    }

    fn shutdown(&self) {
        self.root.cancel();
    }
}
