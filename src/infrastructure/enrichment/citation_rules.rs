//! Domain-based citation categorization

use async_trait::async_trait;

use crate::domain::brand::BrandProfile;
use crate::domain::collection::Citation;
use crate::domain::enrichment::{
    CategorizedCitation, CitationBreakdown, CitationCategory, Enricher, EnrichmentInput,
    EnrichmentPayload, TaskKind,
};
use crate::domain::key_pool::Credential;
use crate::domain::provider::ProviderError;

/// `domain` equals `owned` or is one of its subdomains
fn within(domain: &str, owned: &str) -> bool {
    let owned = owned.trim_start_matches("www.");
    domain == owned
        || domain
            .strip_suffix(owned)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

pub(crate) fn categorize(citation: &Citation, brand: &BrandProfile) -> CitationCategory {
    let domain = citation.domain.as_str();

    if brand.owned_domains.iter().any(|owned| within(domain, owned)) {
        CitationCategory::Owned
    } else if brand
        .competitors
        .iter()
        .flat_map(|c| c.domains.iter())
        .any(|theirs| within(domain, theirs))
    {
        CitationCategory::Competitor
    } else {
        CitationCategory::ThirdParty
    }
}

#[derive(Debug, Default)]
pub struct CitationRulesEnricher;

impl CitationRulesEnricher {
    pub const NAME: &'static str = "citation-rules";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Enricher for CitationRulesEnricher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Citation
    }

    fn requires_credential(&self) -> bool {
        false
    }

    async fn enrich(
        &self,
        input: &EnrichmentInput,
        _credential: Option<&Credential>,
    ) -> Result<EnrichmentPayload, ProviderError> {
        let brand = input.require_brand()?;

        let citations = input
            .result
            .citations()
            .iter()
            .map(|citation| CategorizedCitation {
                url: citation.url.clone(),
                domain: citation.domain.clone(),
                category: categorize(citation, brand),
            })
            .collect();

        Ok(EnrichmentPayload::Citation(CitationBreakdown { citations }))
    }
}
