//! Collected answers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::{BatchId, CollectionRequest, CorrelationId};
use crate::domain::collector::CollectorType;
use crate::domain::provider::ProviderAnswer;
use crate::domain::storage::StorageEntity;

/// A source an answer pointed at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Host without a leading `www.`, empty when the url cannot be parsed
    pub domain: String,
}

impl Citation {
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let domain = domain_of(&url).unwrap_or_default();

        Self {
            url,
            title: None,
            domain,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Lowercased host of `url` without `www.`
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();

    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Normalized answer for one request. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorResult {
    request_id: CorrelationId,
    batch_id: BatchId,
    brand_id: String,
    customer_id: String,
    query_text: String,
    collector_type: CollectorType,
    raw_answer: String,
    citations: Vec<Citation>,
    metadata: serde_json::Map<String, serde_json::Value>,
    provider_used: String,
    completed_at: DateTime<Utc>,
}

impl CollectorResult {
    pub fn from_answer(
        request: &CollectionRequest,
        provider: impl Into<String>,
        answer: ProviderAnswer,
    ) -> Self {
        Self {
            request_id: request.correlation_id().clone(),
            batch_id: request.batch_id().clone(),
            brand_id: request.brand_id().to_string(),
            customer_id: request.customer_id().to_string(),
            query_text: request.query_text().to_string(),
            collector_type: request.collector_type().clone(),
            raw_answer: answer.text,
            citations: answer.citations,
            metadata: answer.metadata,
            provider_used: provider.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn request_id(&self) -> &CorrelationId {
        &self.request_id
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn brand_id(&self) -> &str {
        &self.brand_id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn collector_type(&self) -> &CollectorType {
        &self.collector_type
    }

    pub fn raw_answer(&self) -> &str {
        &self.raw_answer
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }

    pub fn provider_used(&self) -> &str {
        &self.provider_used
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

impl StorageEntity for CollectorResult {
    type Key = CorrelationId;

    fn key(&self) -> &Self::Key {
        &self.request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::fixtures;

    #[test]
    fn test_citation_domain() {
        assert_eq!(Citation::from_url("https://www.Example.com/a?b=1").domain, "example.com");
        assert_eq!(Citation::from_url("http://shop.acme.io").domain, "shop.acme.io");
        assert_eq!(Citation::from_url("not a url").domain, "");
    }

    #[test]
    fn test_result_from_answer() {
        let request = fixtures::request("chat", 2);
        let answer = ProviderAnswer::new("Acme is great")
            .with_citations(vec![Citation::from_url("https://acme.com")]);

        let result = CollectorResult::from_answer(&request, "provider-y", answer);

        assert_eq!(result.request_id(), request.correlation_id());
        assert_eq!(result.raw_answer(), "Acme is great");
        assert_eq!(result.provider_used(), "provider-y");
        assert_eq!(result.citations()[0].domain, "acme.com");
        assert_eq!(result.brand_id(), "brand-acme");
    }
}
