//! Collection requests and their identifiers

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::collector::CollectorType;
use crate::domain::provider::ProviderQuery;
use crate::domain::storage::StorageKey;
use crate::domain::DomainError;

static BATCH_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^batch-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$")
        .expect("batch id pattern is valid")
});

/// Batch identifier: `batch-{uuid}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if !BATCH_ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "'{}' is not a batch id (expected batch-<uuid>)",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(format!("batch-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BatchId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BatchId> for String {
    fn from(id: BatchId) -> Self {
        id.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for BatchId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deterministic request id: `{batch_id}:{query_index}:{collector_type}`.
///
/// Re-submitting the same query of the same batch to the same collector
/// always lands on the same stored result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn for_query(batch_id: &BatchId, query_index: usize, collector: &CollectorType) -> Self {
        Self(format!("{}:{}:{}", batch_id, query_index, collector))
    }

    /// Parses an id received from outside, e.g. a URL path segment
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let parts: Vec<&str> = value.split(':').collect();

        let valid = parts.len() == 3
            && BatchId::new(parts[0]).is_ok()
            && parts[1].parse::<usize>().is_ok()
            && CollectorType::new(parts[2]).is_ok();

        if !valid {
            return Err(DomainError::invalid_id(format!(
                "'{}' is not a correlation id",
                value
            )));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The collector type segment
    pub fn collector_type(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or_default()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for CorrelationId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// One question to one collector type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    correlation_id: CorrelationId,
    batch_id: BatchId,
    query_index: usize,
    query_text: String,
    collector_type: CollectorType,
    locale: String,
    country: String,
    brand_id: String,
    customer_id: String,
}

impl CollectionRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        batch_id: BatchId,
        query_index: usize,
        query_text: impl Into<String>,
        collector_type: CollectorType,
        locale: impl Into<String>,
        country: impl Into<String>,
        brand_id: impl Into<String>,
        customer_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: CorrelationId::for_query(&batch_id, query_index, &collector_type),
            batch_id,
            query_index,
            query_text: query_text.into(),
            collector_type,
            locale: locale.into(),
            country: country.into(),
            brand_id: brand_id.into(),
            customer_id: customer_id.into(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn query_index(&self) -> usize {
        self.query_index
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn collector_type(&self) -> &CollectorType {
        &self.collector_type
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn brand_id(&self) -> &str {
        &self.brand_id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn to_query(&self) -> ProviderQuery {
        ProviderQuery {
            query_text: self.query_text.clone(),
            locale: self.locale.clone(),
            country: self.country.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn request(collector: &str, query_index: usize) -> CollectionRequest {
        CollectionRequest::new(
            BatchId::generate(),
            query_index,
            "best running shoes for flat feet",
            CollectorType::new(collector).unwrap(),
            "en-US",
            "US",
            "brand-acme",
            "customer-1",
        )
    }
}
