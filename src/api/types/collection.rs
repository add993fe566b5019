//! Request and response bodies for `/v1/collections`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::batch::{Batch, BatchStatus, TypeCounters};
use crate::domain::collector::CollectorType;
use crate::domain::orchestrator::BatchSpec;
use crate::domain::DomainError;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitCollectionRequest {
    #[validate(length(min = 1, max = 128))]
    pub brand_id: String,
    #[validate(length(min = 1, max = 128))]
    pub customer_id: String,
    #[validate(
        length(min = 1, max = 500),
        custom(function = "validate_queries")
    )]
    pub queries: Vec<String>,
    #[validate(length(min = 1))]
    pub collector_types: Vec<String>,
    #[serde(default = "default_locale")]
    #[validate(length(min = 2, max = 35))]
    pub locale: String,
    #[serde(default = "default_country")]
    #[validate(length(equal = 2))]
    pub country: String,
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

#[allow(clippy::ptr_arg)]
fn validate_queries(queries: &Vec<String>) -> Result<(), ValidationError> {
    if queries.iter().any(|q| q.trim().is_empty()) {
        let mut err = ValidationError::new("blank_query");
        err.message = Some("queries must not be blank".into());
        return Err(err);
    }
    Ok(())
}

impl SubmitCollectionRequest {
    /// Converts the wire body into a batch spec, rejecting unknown
    /// collector type spellings
    pub fn into_spec(self) -> Result<BatchSpec, DomainError> {
        let collector_types = self
            .collector_types
            .into_iter()
            .map(CollectorType::new)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BatchSpec {
            brand_id: self.brand_id,
            customer_id: self.customer_id,
            queries: self.queries,
            collector_types,
            locale: self.locale,
            country: self.country.to_uppercase(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAccepted {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total_requests: u32,
}

impl From<&Batch> for BatchAccepted {
    fn from(batch: &Batch) -> Self {
        Self {
            batch_id: batch.batch_id().to_string(),
            status: batch.status(),
            total_requests: batch.totals().total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgressResponse {
    pub batch_id: String,
    pub brand_id: String,
    pub customer_id: String,
    pub status: BatchStatus,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub handed_off: u32,
    pub cancelled: u32,
    pub in_flight: u32,
    pub per_collector_type_status: BTreeMap<String, TypeCounters>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Batch> for BatchProgressResponse {
    fn from(batch: &Batch) -> Self {
        let totals = batch.totals();

        Self {
            batch_id: batch.batch_id().to_string(),
            brand_id: batch.brand_id().to_string(),
            customer_id: batch.customer_id().to_string(),
            status: batch.status(),
            total: totals.total,
            completed: totals.completed,
            failed: totals.failed,
            handed_off: totals.handed_off,
            cancelled: totals.cancelled,
            in_flight: totals.in_flight(),
            per_collector_type_status: batch
                .counters()
                .iter()
                .map(|(collector, counters)| (collector.to_string(), *counters))
                .collect(),
            created_at: batch.created_at(),
            updated_at: batch.updated_at(),
        }
    }
}
