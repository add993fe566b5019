//! Scoring coordinator - three independent enrichments per collected result

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::brand::{BrandCatalog, BrandProfile};
use crate::domain::collection::CollectorResult;
use crate::domain::enrichment::{
    EnrichedRecord, Enricher, EnrichmentInput, EnrichmentPayload, EnrichmentRepository,
    EnrichmentTask, TaskKind,
};
use crate::domain::key_pool::KeyPool;
use crate::domain::provider::ProviderError;
use crate::domain::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Results scored concurrently
    pub scoring_width: usize,
    /// Upper bound on one enrichment task, fallbacks included
    pub task_timeout_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scoring_width: 4,
            task_timeout_ms: 45_000,
        }
    }
}

impl ScoringConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

/// The three settled tasks of one result and the record merged from them
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub tasks: [EnrichmentTask; 3],
    pub record: EnrichedRecord,
}

impl ScoringOutcome {
    pub fn task(&self, kind: TaskKind) -> Option<&EnrichmentTask> {
        self.tasks.iter().find(|t| t.task_kind() == kind)
    }
}

/// Runs position, sentiment and citation enrichment for collected results.
///
/// Each task kind walks its own enricher list in registration order and
/// draws credentials under its own operation kind.
pub struct ScoringCoordinator {
    enrichers: HashMap<TaskKind, Vec<Arc<dyn Enricher>>>,
    key_pool: Arc<dyn KeyPool>,
    repository: Arc<dyn EnrichmentRepository>,
    brands: Arc<dyn BrandCatalog>,
    task_timeout: Duration,
    width: Arc<Semaphore>,
}

impl std::fmt::Debug for ScoringCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chains: HashMap<&TaskKind, Vec<&str>> = self
            .enrichers
            .iter()
            .map(|(kind, list)| (kind, list.iter().map(|e| e.name()).collect()))
            .collect();

        f.debug_struct("ScoringCoordinator")
            .field("enrichers", &chains)
            .field("task_timeout", &self.task_timeout)
            .finish()
    }
}

impl ScoringCoordinator {
    pub fn new(
        key_pool: Arc<dyn KeyPool>,
        repository: Arc<dyn EnrichmentRepository>,
        brands: Arc<dyn BrandCatalog>,
        config: &ScoringConfig,
    ) -> Self {
        Self {
            enrichers: HashMap::new(),
            key_pool,
            repository,
            brands,
            task_timeout: config.task_timeout(),
            width: Arc::new(Semaphore::new(config.scoring_width.max(1))),
        }
    }

    /// Appends an enricher to the end of its kind's list
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.register(enricher);
        self
    }

    pub fn register(&mut self, enricher: Arc<dyn Enricher>) {
        self.enrichers
            .entry(enricher.kind())
            .or_default()
            .push(enricher);
    }

    pub fn enrichers_for(&self, kind: TaskKind) -> &[Arc<dyn Enricher>] {
        self.enrichers
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Scores one result. A failed task leaves its field of the merged
    /// record empty; the record itself is always saved.
    #[instrument(skip_all, fields(result_id = %result.request_id()))]
    pub async fn score(&self, result: &CollectorResult) -> Result<ScoringOutcome, DomainError> {
        let _permit = self
            .width
            .acquire()
            .await
            .map_err(|_| DomainError::internal("scoring coordinator is shut down"))?;

        let brand = self.load_brand(result.brand_id()).await;
        let input = EnrichmentInput::new(result.clone(), brand);

        let (position, sentiment, citation) = tokio::join!(
            self.run_task(TaskKind::Position, &input),
            self.run_task(TaskKind::Sentiment, &input),
            self.run_task(TaskKind::Citation, &input),
        );
        let tasks = [position, sentiment, citation];

        let record = EnrichedRecord::merge(result.request_id().clone(), &tasks);
        self.repository.save_record(&record).await?;

        info!(
            position = record.position.is_some(),
            sentiment = record.sentiment.is_some(),
            citations = record.citations.is_some(),
            "Result scored"
        );

        Ok(ScoringOutcome { tasks, record })
    }

    async fn load_brand(&self, brand_id: &str) -> Option<BrandProfile> {
        match self.brands.get(brand_id).await {
            Ok(brand) => {
                if brand.is_none() {
                    debug!(brand_id, "No brand profile, brand-aware enrichers will fail");
                }
                brand
            }
            Err(e) => {
                warn!(brand_id, error = %e, "Brand lookup failed");
                None
            }
        }
    }

    /// Runs one task to a terminal state. Status writes that fail are
    /// logged and never reach the other tasks.
    async fn run_task(&self, kind: TaskKind, input: &EnrichmentInput) -> EnrichmentTask {
        let mut task = EnrichmentTask::pending(input.result.request_id().clone(), kind);
        self.persist(&task).await;

        let transition = match task.start() {
            Ok(()) => {
                self.persist(&task).await;
                match timeout(self.task_timeout, self.run_enrichers(kind, input)).await {
                    Ok(Ok((provider, payload))) => {
                        debug!(kind = %kind, provider = %provider, "Enrichment succeeded");
                        task.succeed(provider, payload)
                    }
                    Ok(Err(reason)) => {
                        warn!(kind = %kind, reason = %reason, "Enrichment failed");
                        task.fail(reason)
                    }
                    Err(_) => {
                        warn!(kind = %kind, timeout = ?self.task_timeout, "Enrichment timed out");
                        task.fail(format!("timed out after {:?}", self.task_timeout))
                    }
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = transition {
            error!(kind = %kind, error = %e, "Enrichment task left in an unexpected state");
        }

        self.persist(&task).await;
        task
    }

    async fn persist(&self, task: &EnrichmentTask) {
        if let Err(e) = self.repository.save_task(task).await {
            warn!(
                kind = %task.task_kind(),
                status = ?task.status(),
                error = %e,
                "Failed to persist enrichment task"
            );
        }
    }

    /// Tries each enricher of `kind` until one produces a payload
    async fn run_enrichers(
        &self,
        kind: TaskKind,
        input: &EnrichmentInput,
    ) -> Result<(String, EnrichmentPayload), String> {
        let chain = self.enrichers_for(kind);
        if chain.is_empty() {
            return Err(format!("no enrichers configured for {}", kind));
        }

        let mut failures = Vec::with_capacity(chain.len());

        for enricher in chain {
            let lease = if enricher.requires_credential() {
                match self.key_pool.acquire(kind.operation_kind(), enricher.name()) {
                    Ok(lease) => Some(lease),
                    Err(e) => {
                        debug!(enricher = enricher.name(), error = %e, "Skipping enricher");
                        failures.push(format!("{}: {}", enricher.name(), e));
                        continue;
                    }
                }
            } else {
                None
            };

            match enricher
                .enrich(input, lease.as_ref().map(|l| l.credential()))
                .await
            {
                Ok(payload) if payload.kind() == kind => {
                    if let Some(lease) = &lease {
                        self.key_pool.report_success(lease);
                    }
                    return Ok((enricher.name().to_string(), payload));
                }
                Ok(payload) => {
                    failures.push(format!(
                        "{}: produced a {} payload",
                        enricher.name(),
                        payload.kind()
                    ));
                }
                Err(e) => {
                    if let (ProviderError::RateLimited { retry_after, .. }, Some(lease)) =
                        (&e, &lease)
                    {
                        self.key_pool.report_rate_limited(lease, *retry_after);
                    }
                    debug!(enricher = enricher.name(), error = %e, "Enricher failed");
                    failures.push(format!("{}: {}", enricher.name(), e));
                }
            }
        }

        Err(failures.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::domain::brand::MockBrandCatalog;
    use crate::domain::collection::fixtures;
    use crate::domain::enrichment::mock::StaticEnricher;
    use crate::domain::enrichment::{
        CitationBreakdown, MockEnrichmentRepository, PositionCounts, SentimentScore, TaskStatus,
    };
    use crate::domain::key_pool::{
        Credential, CredentialLease, KeyPoolError, OperationKind, SlotKey,
    };
    use crate::domain::provider::ProviderAnswer;

    /// Credentials only for the listed (operation, provider) pairs
    #[derive(Debug, Default)]
    struct StubKeyPool {
        available: Vec<(OperationKind, String)>,
        acquired: Mutex<Vec<(OperationKind, String)>>,
    }

    impl KeyPool for StubKeyPool {
        fn acquire(
            &self,
            operation: OperationKind,
            provider: &str,
        ) -> Result<CredentialLease, KeyPoolError> {
            if !self
                .available
                .iter()
                .any(|(op, p)| *op == operation && p == provider)
            {
                return Err(KeyPoolError::NoCredentials {
                    operation,
                    provider: provider.to_string(),
                });
            }
            self.acquired
                .lock()
                .unwrap()
                .push((operation, provider.to_string()));
            Ok(CredentialLease::new(
                SlotKey::new(operation, provider, "k1"),
                Credential::new("k1", "secret"),
            ))
        }

        fn lease_slot(&self, _key: &SlotKey) -> Option<CredentialLease> {
            None
        }

        fn report_rate_limited(
            &self,
            _lease: &CredentialLease,
            _retry_after: Option<Duration>,
        ) -> Duration {
            Duration::ZERO
        }

        fn report_success(&self, _lease: &CredentialLease) {}
    }

    fn result() -> CollectorResult {
        CollectorResult::from_answer(
            &fixtures::request("chat", 0),
            "provider-a",
            ProviderAnswer::new("Acme is great"),
        )
    }

    fn brands() -> MockBrandCatalog {
        let mut brands = MockBrandCatalog::new();
        brands.expect_get().returning(|_| Ok(None));
        brands
    }

    fn accepting_repository() -> MockEnrichmentRepository {
        let mut repo = MockEnrichmentRepository::new();
        repo.expect_save_task().returning(|_| Ok(()));
        repo.expect_save_record().returning(|_| Ok(()));
        repo
    }

    fn coordinator(
        key_pool: StubKeyPool,
        repo: MockEnrichmentRepository,
        enrichers: Vec<Arc<dyn Enricher>>,
    ) -> ScoringCoordinator {
        let config = ScoringConfig {
            scoring_width: 2,
            task_timeout_ms: 1_000,
        };
        enrichers.into_iter().fold(
            ScoringCoordinator::new(Arc::new(key_pool), Arc::new(repo), Arc::new(brands()), &config),
            |c, e| c.with_enricher(e),
        )
    }

    fn position_rules() -> Arc<dyn Enricher> {
        Arc::new(StaticEnricher::succeeding(
            "position-rules",
            EnrichmentPayload::Position(PositionCounts {
                brand_mentions: 1,
                ..Default::default()
            }),
        ))
    }

    fn citation_rules() -> Arc<dyn Enricher> {
        Arc::new(StaticEnricher::succeeding(
            "citation-rules",
            EnrichmentPayload::Citation(CitationBreakdown::default()),
        ))
    }

    #[tokio::test]
    async fn test_failing_sentiment_leaves_only_sentiment_empty() {
        let mut repo = MockEnrichmentRepository::new();
        repo.expect_save_task().times(9).returning(|_| Ok(()));
        repo.expect_save_record()
            .withf(|record| {
                record.position.is_some() && record.sentiment.is_none() && record.citations.is_some()
            })
            .times(1)
            .returning(|_| Ok(()));

        let coordinator = coordinator(
            StubKeyPool::default(),
            repo,
            vec![
                position_rules(),
                Arc::new(StaticEnricher::failing(
                    "sentiment-model",
                    TaskKind::Sentiment,
                    ProviderError::fatal("model unavailable"),
                )),
                citation_rules(),
            ],
        );

        let outcome = coordinator.score(&result()).await.unwrap();

        let sentiment = outcome.task(TaskKind::Sentiment).unwrap();
        assert_eq!(sentiment.status(), TaskStatus::Failed);
        assert!(sentiment.error().unwrap().contains("model unavailable"));
        assert_eq!(
            outcome.task(TaskKind::Position).unwrap().status(),
            TaskStatus::Succeeded
        );
        assert!(outcome.record.sentiment.is_none());
    }

    #[tokio::test]
    async fn test_task_store_failure_stays_within_its_task() {
        let mut repo = MockEnrichmentRepository::new();
        repo.expect_save_task().returning(|task| match task.task_kind() {
            TaskKind::Sentiment => Err(DomainError::storage("task table unavailable")),
            _ => Ok(()),
        });
        repo.expect_save_record()
            .withf(|record| record.position.is_some() && record.citations.is_some())
            .times(1)
            .returning(|_| Ok(()));

        let coordinator = coordinator(
            StubKeyPool::default(),
            repo,
            vec![position_rules(), citation_rules()],
        );

        let outcome = coordinator.score(&result()).await.unwrap();

        assert_eq!(
            outcome.task(TaskKind::Position).unwrap().status(),
            TaskStatus::Succeeded
        );
        assert_eq!(
            outcome.task(TaskKind::Citation).unwrap().status(),
            TaskStatus::Succeeded
        );
        assert_eq!(
            outcome.task(TaskKind::Sentiment).unwrap().status(),
            TaskStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_next_enricher() {
        let primary = Arc::new(StaticEnricher::failing(
            "sentiment-model",
            TaskKind::Sentiment,
            ProviderError::retryable("upstream 503"),
        ));
        let lexicon = Arc::new(StaticEnricher::succeeding(
            "sentiment-lexicon",
            EnrichmentPayload::Sentiment(SentimentScore::from_score(0.4)),
        ));

        let coordinator = coordinator(
            StubKeyPool::default(),
            accepting_repository(),
            vec![position_rules(), primary.clone(), lexicon.clone(), citation_rules()],
        );

        let outcome = coordinator.score(&result()).await.unwrap();
        let sentiment = outcome.task(TaskKind::Sentiment).unwrap();

        assert_eq!(sentiment.provider_used(), Some("sentiment-lexicon"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(lexicon.calls(), 1);
        assert!(outcome.record.sentiment.is_some());
    }

    #[tokio::test]
    async fn test_enricher_without_credentials_is_skipped() {
        let model = Arc::new(
            StaticEnricher::succeeding(
                "sentiment-model",
                EnrichmentPayload::Sentiment(SentimentScore::from_score(0.9)),
            )
            .with_credential(),
        );
        let lexicon = Arc::new(StaticEnricher::succeeding(
            "sentiment-lexicon",
            EnrichmentPayload::Sentiment(SentimentScore::from_score(0.2)),
        ));

        let coordinator = coordinator(
            StubKeyPool::default(),
            accepting_repository(),
            vec![model.clone(), lexicon],
        );

        let outcome = coordinator.score(&result()).await.unwrap();

        assert_eq!(model.calls(), 0);
        assert_eq!(
            outcome.task(TaskKind::Sentiment).unwrap().provider_used(),
            Some("sentiment-lexicon")
        );
        // nothing registered for these kinds
        assert_eq!(
            outcome.task(TaskKind::Position).unwrap().status(),
            TaskStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_credentials_drawn_under_task_operation_kind() {
        let key_pool = StubKeyPool {
            available: vec![(OperationKind::SentimentScoring, "sentiment-model".to_string())],
            ..Default::default()
        };
        let model: Arc<dyn Enricher> = Arc::new(
            StaticEnricher::succeeding(
                "sentiment-model",
                EnrichmentPayload::Sentiment(SentimentScore::from_score(0.9)),
            )
            .with_credential(),
        );

        let key_pool = Arc::new(key_pool);
        let coordinator = ScoringCoordinator::new(
            key_pool.clone(),
            Arc::new(accepting_repository()),
            Arc::new(brands()),
            &ScoringConfig::default(),
        )
        .with_enricher(model);

        let outcome = coordinator.score(&result()).await.unwrap();

        assert_eq!(
            outcome.task(TaskKind::Sentiment).unwrap().provider_used(),
            Some("sentiment-model")
        );
        assert_eq!(
            *key_pool.acquired.lock().unwrap(),
            vec![(OperationKind::SentimentScoring, "sentiment-model".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_timeout_bounds_the_whole_chain() {
        let slow = Arc::new(
            StaticEnricher::succeeding(
                "citation-model",
                EnrichmentPayload::Citation(CitationBreakdown::default()),
            )
            .with_delay(Duration::from_secs(5)),
        );

        let coordinator = coordinator(
            StubKeyPool::default(),
            accepting_repository(),
            vec![position_rules(), slow],
        );

        let outcome = coordinator.score(&result()).await.unwrap();
        let citation = outcome.task(TaskKind::Citation).unwrap();

        assert_eq!(citation.status(), TaskStatus::Failed);
        assert!(citation.error().unwrap().contains("timed out"));
        assert!(outcome.record.citations.is_none());
        assert!(outcome.record.position.is_some());
    }
}
