//! Domain layer - Core business logic and entities

pub mod attempt;
pub mod batch;
pub mod brand;
pub mod chain;
pub mod collection;
pub mod collector;
pub mod enrichment;
pub mod error;
pub mod key_pool;
pub mod orchestrator;
pub mod polling;
pub mod provider;
pub mod scoring;
pub mod storage;

pub use attempt::{AttemptLog, AttemptStatus, AttemptTrail, ProviderAttempt};
pub use batch::{Batch, BatchEvent, BatchRepository, BatchStatus, TypeCounters};
pub use brand::{BrandCatalog, BrandProfile, Competitor};
pub use chain::{ChainError, ChainExecutor, ChainOutcome, ResumeOutcome, RetryConfig};
pub use collection::{
    BatchId, Citation, CollectionRequest, CollectorResult, CollectorResultRepository,
    CorrelationId,
};
pub use collector::{
    CollectorConfig, CollectorRegistry, CollectorType, CollectorValidationError, ProviderBinding,
    RegistryHandle,
};
pub use enrichment::{
    EnrichedRecord, Enricher, EnrichmentInput, EnrichmentPayload, EnrichmentRepository,
    EnrichmentTask, TaskKind, TaskStatus,
};
pub use error::DomainError;
pub use key_pool::{
    BackoffPolicy, Credential, CredentialLease, KeyPool, KeyPoolError, OperationKind, SlotKey,
};
pub use orchestrator::{
    BatchSpec, CollectionOrchestrator, CollectionOutcome, OrchestratorConfig, PreparedBatch,
};
pub use polling::{
    AsyncPoller, PendingJob, PendingJobRepository, PendingJobStatus, PollOutcome, PollTier,
    PollingConfig,
};
pub use provider::{
    JobHandle, JobStatus, ProviderAdapter, ProviderAnswer, ProviderError, ProviderQuery,
    ProviderRegistry, Submission,
};
pub use scoring::{ScoringConfig, ScoringCoordinator, ScoringOutcome};
pub use storage::{Storage, StorageEntity, StorageKey, TextKey};
