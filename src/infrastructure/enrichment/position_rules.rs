//! Rule-based position extraction: whole-word, case-insensitive name
//! matching over the raw answer

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;

use crate::domain::brand::BrandProfile;
use crate::domain::enrichment::{
    Enricher, EnrichmentInput, EnrichmentPayload, PositionCounts, TaskKind,
};
use crate::domain::key_pool::Credential;
use crate::domain::provider::ProviderError;

#[derive(Debug, Default)]
pub struct PositionRulesEnricher;

impl PositionRulesEnricher {
    pub const NAME: &'static str = "position-rules";

    pub fn new() -> Self {
        Self
    }
}

fn name_pattern<'a>(names: impl Iterator<Item = &'a str>) -> Result<Option<Regex>, ProviderError> {
    let alternatives: Vec<String> = names
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|name| {
            // \b only holds next to a word character
            let starts_word = name.chars().next().is_some_and(char::is_alphanumeric);
            let ends_word = name.chars().last().is_some_and(char::is_alphanumeric);
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(name),
                if ends_word { r"\b" } else { "" },
            )
        })
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }

    Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))
        .map(Some)
        .map_err(|e| ProviderError::fatal(format!("Invalid name pattern: {}", e)))
}

/// Occurrence count and first byte offset of any of `names` in `text`
fn scan<'a>(
    text: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(u32, Option<usize>), ProviderError> {
    let Some(pattern) = name_pattern(names)? else {
        return Ok((0, None));
    };

    let mut count = 0u32;
    let mut first = None;
    for found in pattern.find_iter(text) {
        count += 1;
        first.get_or_insert(found.start());
    }

    Ok((count, first))
}

pub(crate) fn count_positions(text: &str, brand: &BrandProfile) -> Result<PositionCounts, ProviderError> {
    let (brand_mentions, brand_first) = scan(text, brand.names())?;

    let mut competitor_mentions = BTreeMap::new();
    let mut first_seen = Vec::new();
    for competitor in &brand.competitors {
        let (count, first) = scan(text, competitor.names())?;
        if count > 0 {
            competitor_mentions.insert(competitor.name.clone(), count);
        }
        if let Some(offset) = first {
            first_seen.push(offset);
        }
    }

    let brand_rank = brand_first.map(|offset| {
        let ahead = first_seen.iter().filter(|other| **other < offset).count();
        ahead as u32 + 1
    });

    Ok(PositionCounts {
        brand_mentions,
        competitor_mentions,
        brand_rank,
    })
}

#[async_trait]
impl Enricher for PositionRulesEnricher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Position
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
        count_positions(input.answer(), brand).map(EnrichmentPayload::Position)
    }
}
