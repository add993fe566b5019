//! Enrichment infrastructure - storage, model-backed and rule-based enrichers

mod citation_rules;
mod factory;
mod model_enricher;
mod position_rules;
mod sentiment_lexicon;
mod storage_repository;

pub use citation_rules::CitationRulesEnricher;
pub use factory::{EnricherConfig, EnricherFactory, EnricherKind, EnrichmentConfig};
pub use model_enricher::ModelEnricher;
pub use position_rules::PositionRulesEnricher;
pub use sentiment_lexicon::{lexicon_score, SentimentLexiconEnricher};
pub use storage_repository::StorageEnrichmentRepository;
