//! Collection orchestrator - fans a batch out across collector types

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::outcome::{BatchSpec, CollectionOutcome};
use crate::domain::batch::{Batch, BatchEvent, BatchRepository};
use crate::domain::chain::{ChainError, ChainExecutor, ChainOutcome, ResumeOutcome};
use crate::domain::collection::{
    BatchId, CollectionRequest, CollectorResult, CollectorResultRepository,
};
use crate::domain::collector::{CollectorConfig, CollectorType, RegistryHandle};
use crate::domain::scoring::ScoringCoordinator;
use crate::domain::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Requests in flight per collector type
    pub batch_width: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { batch_width: 4 }
    }
}

/// Requests of one collector type, with the config they run under
#[derive(Debug, Clone)]
struct Lane {
    config: CollectorConfig,
    requests: Vec<CollectionRequest>,
}

/// A batch that has been validated and registered, ready to run.
///
/// Collector configs are captured when the batch is prepared, so a registry
/// reload never changes a running batch.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    batch_id: BatchId,
    lanes: Vec<Lane>,
    registry_version: u64,
}

impl PreparedBatch {
    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn request_count(&self) -> usize {
        self.lanes.iter().map(|lane| lane.requests.len()).sum()
    }

    pub fn registry_version(&self) -> u64 {
        self.registry_version
    }
}

pub struct CollectionOrchestrator {
    registry: Arc<RegistryHandle>,
    executor: Arc<ChainExecutor>,
    results: Arc<dyn CollectorResultRepository>,
    batches: Arc<dyn BatchRepository>,
    scoring: Arc<ScoringCoordinator>,
    batch_width: usize,
}

impl std::fmt::Debug for CollectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionOrchestrator")
            .field("executor", &self.executor)
            .field("scoring", &self.scoring)
            .field("batch_width", &self.batch_width)
            .finish()
    }
}

impl CollectionOrchestrator {
    pub fn new(
        registry: Arc<RegistryHandle>,
        executor: Arc<ChainExecutor>,
        results: Arc<dyn CollectorResultRepository>,
        batches: Arc<dyn BatchRepository>,
        scoring: Arc<ScoringCoordinator>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            results,
            batches,
            scoring,
            batch_width: config.batch_width.max(1),
        }
    }

    pub fn executor(&self) -> &ChainExecutor {
        &self.executor
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Validates the spec against the current registry and registers the
    /// batch. Nothing is sent to any provider yet.
    #[instrument(skip_all, fields(brand_id = %spec.brand_id, queries = spec.queries.len()))]
    pub async fn prepare(&self, spec: &BatchSpec) -> Result<PreparedBatch, DomainError> {
        spec.validate()?;

        let registry = self.registry.snapshot();
        let mut seen = BTreeSet::new();
        let mut configs = Vec::new();
        for collector_type in &spec.collector_types {
            if !seen.insert(collector_type) {
                continue;
            }
            let config = registry.get(collector_type).ok_or_else(|| {
                DomainError::validation(format!("unknown collector type '{}'", collector_type))
            })?;
            configs.push(config.clone());
        }

        let batch_id = BatchId::generate();
        let lanes: Vec<Lane> = configs
            .into_iter()
            .map(|config| {
                let requests = spec
                    .queries
                    .iter()
                    .enumerate()
                    .map(|(index, query)| {
                        CollectionRequest::new(
                            batch_id.clone(),
                            index,
                            query.clone(),
                            config.collector_type().clone(),
                            spec.locale.clone(),
                            spec.country.clone(),
                            spec.brand_id.clone(),
                            spec.customer_id.clone(),
                        )
                    })
                    .collect();
                Lane { config, requests }
            })
            .collect();

        let types: Vec<CollectorType> = lanes
            .iter()
            .map(|lane| lane.config.collector_type().clone())
            .collect();
        self.batches
            .create(Batch::new(
                batch_id.clone(),
                spec.brand_id.clone(),
                spec.customer_id.clone(),
                spec.queries.len(),
                &types,
            ))
            .await?;

        info!(
            batch_id = %batch_id,
            collector_types = types.len(),
            registry_version = registry.version(),
            "Batch prepared"
        );

        Ok(PreparedBatch {
            batch_id,
            lanes,
            registry_version: registry.version(),
        })
    }

    /// Runs a prepared batch. Each collector type keeps at most
    /// `batch_width` requests in flight; outcomes arrive as they complete.
    pub fn collect(
        self: Arc<Self>,
        prepared: PreparedBatch,
        cancel: CancellationToken,
    ) -> BoxStream<'static, CollectionOutcome> {
        let width = self.batch_width;

        let lanes = prepared.lanes.into_iter().map(|lane| {
            let this = Arc::clone(&self);
            let config = Arc::new(lane.config);
            let cancel = cancel.clone();

            stream::iter(lane.requests)
                .map(move |request| {
                    let this = Arc::clone(&this);
                    let config = Arc::clone(&config);
                    let cancel = cancel.clone();
                    async move { this.run_request(request, &config, &cancel).await }
                })
                .buffer_unordered(width)
                .boxed()
        });

        stream::select_all(lanes).boxed()
    }

    #[instrument(
        skip_all,
        fields(
            request_id = %request.correlation_id(),
            collector = %request.collector_type()
        )
    )]
    async fn run_request(
        &self,
        request: CollectionRequest,
        config: &CollectorConfig,
        cancel: &CancellationToken,
    ) -> CollectionOutcome {
        let request_id = request.correlation_id().clone();

        match self.executor.execute(&request, config, cancel).await {
            Ok(ChainOutcome::Completed(result)) => {
                self.finish_result(result, BatchEvent::Completed).await
            }
            Ok(ChainOutcome::HandedOff(job)) => {
                self.record_event(&request, BatchEvent::HandedOff).await;
                CollectionOutcome::HandedOff { request_id, job }
            }
            Err(ChainError::Cancelled { attempts, .. }) => {
                self.record_event(&request, BatchEvent::Cancelled).await;
                CollectionOutcome::Cancelled {
                    request_id,
                    attempts,
                }
            }
            Err(err) => {
                warn!(error = %err, "Request failed");
                self.record_event(&request, BatchEvent::Failed).await;
                CollectionOutcome::Failed {
                    request_id,
                    error: err.to_string(),
                    attempts: err.attempts().to_vec(),
                }
            }
        }
    }

    /// Applies the outcome of a resumed handoff to its batch. Returns `None`
    /// when the job is still pending or had already settled.
    pub async fn settle_handoff(&self, outcome: &ResumeOutcome) -> Option<CollectionOutcome> {
        match outcome {
            ResumeOutcome::Completed { result, .. } => {
                Some(
                    self.finish_result(result.clone(), BatchEvent::HandoffSucceeded)
                        .await,
                )
            }
            ResumeOutcome::Failed(job) | ResumeOutcome::TimedOut(job) => {
                self.record_event(job.request(), BatchEvent::HandoffFailed)
                    .await;
                Some(CollectionOutcome::Failed {
                    request_id: job.request().correlation_id().clone(),
                    error: job.error().unwrap_or("job failed").to_string(),
                    attempts: Vec::new(),
                })
            }
            ResumeOutcome::StillPending(_) | ResumeOutcome::AlreadySettled(_) => None,
        }
    }

    /// Persists a result, counts it, then scores it
    async fn finish_result(&self, result: CollectorResult, event: BatchEvent) -> CollectionOutcome {
        let batch_id = result.batch_id().clone();
        let collector_type = result.collector_type().clone();
        let request_id = result.request_id().clone();

        let saved = match self.results.save(result).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "Failed to persist result");
                let failed = match event {
                    BatchEvent::HandoffSucceeded => BatchEvent::HandoffFailed,
                    _ => BatchEvent::Failed,
                };
                self.record(&batch_id, &collector_type, failed).await;
                return CollectionOutcome::Failed {
                    request_id,
                    error: e.to_string(),
                    attempts: Vec::new(),
                };
            }
        };

        self.record(&batch_id, &collector_type, event).await;

        let enrichment = match self.scoring.score(&saved).await {
            Ok(outcome) => Some(outcome.record),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Scoring failed");
                None
            }
        };

        CollectionOutcome::Completed {
            result: saved,
            enrichment,
        }
    }

    async fn record_event(&self, request: &CollectionRequest, event: BatchEvent) {
        self.record(request.batch_id(), request.collector_type(), event)
            .await;
    }

    async fn record(&self, batch_id: &BatchId, collector_type: &CollectorType, event: BatchEvent) {
        if let Err(e) = self.batches.record(batch_id, collector_type, event).await {
            warn!(
                batch_id = %batch_id,
                collector = %collector_type,
                event = ?event,
                error = %e,
                "Failed to update batch counters"
            );
        }
    }
}
