use serde::{Deserialize, Serialize};

use crate::domain::attempt::ProviderAttempt;
use crate::domain::collection::{CollectorResult, CorrelationId};
use crate::domain::collector::CollectorType;
use crate::domain::enrichment::EnrichedRecord;
use crate::domain::polling::PendingJob;
use crate::domain::DomainError;

/// What to collect: every query against every listed collector type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSpec {
    pub brand_id: String,
    pub customer_id: String,
    pub queries: Vec<String>,
    pub collector_types: Vec<CollectorType>,
    pub locale: String,
    pub country: String,
}

impl BatchSpec {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.brand_id.trim().is_empty() {
            return Err(DomainError::validation("brand_id is required"));
        }
        if self.customer_id.trim().is_empty() {
            return Err(DomainError::validation("customer_id is required"));
        }
        if self.queries.is_empty() {
            return Err(DomainError::validation("at least one query is required"));
        }
        if let Some(index) = self.queries.iter().position(|q| q.trim().is_empty()) {
            return Err(DomainError::validation(format!("query {} is empty", index)));
        }
        if self.collector_types.is_empty() {
            return Err(DomainError::validation(
                "at least one collector type is required",
            ));
        }
        Ok(())
    }
}

/// How one (query, collector type) pair ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectionOutcome {
    Completed {
        result: CollectorResult,
        /// `None` when scoring itself could not run
        enrichment: Option<EnrichedRecord>,
    },
    HandedOff {
        request_id: CorrelationId,
        job: PendingJob,
    },
    Failed {
        request_id: CorrelationId,
        error: String,
        attempts: Vec<ProviderAttempt>,
    },
    Cancelled {
        request_id: CorrelationId,
        attempts: Vec<ProviderAttempt>,
    },
}

impl CollectionOutcome {
    pub fn request_id(&self) -> &CorrelationId {
        match self {
            Self::Completed { result, .. } => result.request_id(),
            Self::HandedOff { request_id, .. }
            | Self::Failed { request_id, .. }
            | Self::Cancelled { request_id, .. } => request_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::HandedOff { .. } => "handed_off",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
