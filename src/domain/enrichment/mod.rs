//! Enrichment domain - position, sentiment and citation signals

mod enricher;
mod entity;
mod repository;

pub use enricher::{Enricher, EnrichmentInput};
pub use entity::{
    CategorizedCitation, CitationBreakdown, CitationCategory, EnrichedRecord, EnrichmentPayload,
    EnrichmentTask, PositionCounts, SentimentLabel, SentimentScore, TaskKind, TaskStatus,
};
pub use repository::EnrichmentRepository;

#[cfg(test)]
pub use enricher::mock;
#[cfg(test)]
pub use repository::MockEnrichmentRepository;
