//! PMP Answer Collector
//!
//! Collects answers about a brand from several AI answer providers:
//! - Per collector type fallback chains with retry and rate-limit aware
//!   credential rotation
//! - Two-tier polling for providers that answer asynchronously, with
//!   background reconciliation of handed-off jobs
//! - Position, sentiment and citation enrichment of every collected answer

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use domain::{
    AsyncPoller, ChainExecutor, CollectionOrchestrator, CollectorRegistry, RegistryHandle,
    ScoringCoordinator,
};
use infrastructure::{
    attempt::StorageAttemptLog,
    batch::StorageBatchRepository,
    brand::ConfigBrandCatalog,
    collection::StorageCollectorResultRepository,
    enrichment::{EnricherFactory, StorageEnrichmentRepository},
    polling::StoragePendingJobRepository,
    providers::ProviderFactory,
    reconciliation::ReconciliationSweeper,
    services::{CollectionService, CollectionServiceTrait},
    storage::StorageFactory,
};
use tracing::info;

/// Everything the commands need, built once from configuration
#[derive(Clone)]
pub struct AppContext {
    pub state: AppState,
    pub service: Arc<CollectionService>,
    pub sweeper: Arc<ReconciliationSweeper>,
    pub registry: Arc<RegistryHandle>,
}

/// Create the application state with all services initialized
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    Ok(create_app_context(config).await?.state)
}

pub async fn create_app_context(config: &AppConfig) -> anyhow::Result<AppContext> {
    let storage = StorageFactory::connect(&config.storage).await?;

    let results = Arc::new(StorageCollectorResultRepository::new(
        storage.create("collector_results").await?,
    ));
    let attempts = Arc::new(StorageAttemptLog::new(storage.create("attempt_trails").await?));
    let pending_jobs = Arc::new(StoragePendingJobRepository::new(
        storage.create("pending_jobs").await?,
    ));
    let batches = Arc::new(StorageBatchRepository::new(storage.create("batches").await?));
    let enrichment = Arc::new(StorageEnrichmentRepository::new(
        storage.create("enrichment_tasks").await?,
        storage.create("enriched_records").await?,
    ));

    let providers = ProviderFactory::build_registry(&config.providers)?;
    let provider_names: Vec<String> = providers.names().into_iter().map(str::to_string).collect();

    let collectors = config.collector_configs()?;
    let registry = Arc::new(RegistryHandle::new(CollectorRegistry::new(1, collectors)));

    let key_pool = Arc::new(config.key_pool.build()?);
    info!(
        providers = provider_names.len(),
        collectors = registry.snapshot().len(),
        credential_slots = key_pool.slot_count(),
        storage = ?storage.storage_type(),
        "Collection stack configured"
    );

    let executor = ChainExecutor::new(
        providers,
        key_pool.clone(),
        attempts,
        pending_jobs.clone(),
        Arc::new(AsyncPoller::new(config.polling.clone())),
    )
    .with_default_retry(config.retry.clone());

    let mut scoring = ScoringCoordinator::new(
        key_pool,
        enrichment.clone(),
        Arc::new(ConfigBrandCatalog::new(config.brands.clone())?),
        &config.scoring,
    );
    for enricher in EnricherFactory::build_all(&config.enrichment)? {
        scoring.register(enricher);
    }

    let orchestrator = CollectionOrchestrator::new(
        registry.clone(),
        Arc::new(executor),
        results.clone(),
        batches.clone(),
        Arc::new(scoring),
        &config.orchestrator,
    );

    let service = Arc::new(CollectionService::new(
        Arc::new(orchestrator),
        results,
        enrichment,
        batches,
    ));
    let dyn_service: Arc<dyn CollectionServiceTrait> = service.clone();

    let sweeper = Arc::new(ReconciliationSweeper::new(
        dyn_service.clone(),
        pending_jobs.clone(),
        config.sweeper.clone(),
    ));

    Ok(AppContext {
        state: AppState::new(dyn_service, pending_jobs, provider_names),
        service,
        sweeper,
        registry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::BatchId;

    #[tokio::test]
    async fn test_default_config_builds_in_memory_stack() {
        let context = tokio_test::assert_ok!(create_app_context(&AppConfig::default()).await);

        assert!(context.state.providers.is_empty());
        assert!(context.registry.snapshot().is_empty());
        assert_eq!(context.registry.snapshot().version(), 1);
        assert_eq!(context.service.running_batches(), 0);

        let err = tokio_test::assert_err!(
            context
                .state
                .collection_service
                .progress(&BatchId::generate())
                .await
        );
        assert!(matches!(err, domain::DomainError::NotFound { .. }));
    }
}
