use std::fmt::Debug;

use async_trait::async_trait;

use super::entity::{EnrichmentPayload, TaskKind};
use crate::domain::brand::BrandProfile;
use crate::domain::collection::CollectorResult;
use crate::domain::key_pool::Credential;
use crate::domain::provider::ProviderError;

/// What an enricher gets to look at
#[derive(Debug, Clone)]
pub struct EnrichmentInput {
    pub result: CollectorResult,
    pub brand: Option<BrandProfile>,
}

impl EnrichmentInput {
    pub fn new(result: CollectorResult, brand: Option<BrandProfile>) -> Self {
        Self { result, brand }
    }

    pub fn answer(&self) -> &str {
        self.result.raw_answer()
    }

    /// The brand profile, or a fatal error for enrichers that cannot run
    /// without one
    pub fn require_brand(&self) -> Result<&BrandProfile, ProviderError> {
        self.brand.as_ref().ok_or_else(|| {
            ProviderError::fatal(format!(
                "no brand profile for '{}'",
                self.result.brand_id()
            ))
        })
    }
}

/// One way of producing a single kind of enrichment.
///
/// Model-backed enrichers draw a credential from the key pool under the
/// task's operation kind; rule-based ones run without any.
#[async_trait]
pub trait Enricher: Send + Sync + Debug {
    /// Provider name used for key pool lookups and `provider_used`
    fn name(&self) -> &str;

    fn kind(&self) -> TaskKind;

    fn requires_credential(&self) -> bool;

    async fn enrich(
        &self,
        input: &EnrichmentInput,
        credential: Option<&Credential>,
    ) -> Result<EnrichmentPayload, ProviderError>;
}
