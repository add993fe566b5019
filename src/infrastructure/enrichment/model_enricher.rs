//! Model-backed enricher
//!
//! Asks a chat completions model to read the collected answer and reply
//! with a JSON object for one task kind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::brand::BrandProfile;
use crate::domain::collection::domain_of;
use crate::domain::enrichment::{
    CategorizedCitation, CitationBreakdown, CitationCategory, Enricher, EnrichmentInput,
    EnrichmentPayload, PositionCounts, SentimentScore, TaskKind,
};
use crate::domain::key_pool::Credential;
use crate::domain::provider::ProviderError;
use crate::infrastructure::providers::HttpClientTrait;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug)]
pub struct ModelEnricher<C: HttpClientTrait> {
    name: String,
    kind: TaskKind,
    client: C,
    base_url: String,
    model: String,
}

impl<C: HttpClientTrait> ModelEnricher<C> {
    pub fn new(name: impl Into<String>, kind: TaskKind, client: C, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_prompt(&self, input: &EnrichmentInput) -> Result<String, ProviderError> {
        let answer = input.answer();

        let prompt = match self.kind {
            TaskKind::Position => {
                let brand = input.require_brand()?;
                format!(
                    "Brand: {}\nCompetitors: {}\n\nCount how often the brand and each competitor \
                     is mentioned in the answer below, and give the brand's 1-based rank by \
                     order of first mention (null if absent).\nReply with JSON only: \
                     {{\"brand_mentions\": n, \"competitor_mentions\": {{\"name\": n}}, \
                     \"brand_rank\": n | null}}\n\nAnswer:\n{}",
                    names_of(brand),
                    brand
                        .competitors
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    answer
                )
            }
            TaskKind::Sentiment => {
                let subject = match &input.brand {
                    Some(brand) => format!("the brand {}", names_of(brand)),
                    None => "the products it mentions".to_string(),
                };
                format!(
                    "Rate how the answer below portrays {} on a scale from -1.0 (very \
                     negative) to 1.0 (very positive).\nReply with JSON only: \
                     {{\"score\": number}}\n\nAnswer:\n{}",
                    subject, answer
                )
            }
            TaskKind::Citation => {
                let brand = input.require_brand()?;
                let urls: Vec<&str> = input
                    .result
                    .citations()
                    .iter()
                    .map(|c| c.url.as_str())
                    .collect();
                format!(
                    "Brand: {}\nBrand domains: {}\n\nClassify each cited URL as \"owned\" (the \
                     brand's own site), \"competitor\" or \"third_party\".\nReply with JSON \
                     only: {{\"citations\": [{{\"url\": string, \"category\": string}}]}}\n\n\
                     URLs:\n{}",
                    brand.name,
                    brand.owned_domains.join(", "),
                    urls.join("\n")
                )
            }
        };

        Ok(prompt)
    }

    fn parse_content(&self, content: &str) -> Result<EnrichmentPayload, ProviderError> {
        let json = extract_json(content).unwrap_or(content);

        let invalid = |e: serde_json::Error| {
            warn!(enricher = %self.name, error = %e, "Unparseable enrichment reply");
            ProviderError::fatal(format!("Invalid {} reply: {}", self.kind, e))
        };

        let payload = match self.kind {
            TaskKind::Position => {
                let reply: PositionReply = serde_json::from_str(json).map_err(invalid)?;
                EnrichmentPayload::Position(PositionCounts {
                    brand_mentions: reply.brand_mentions,
                    competitor_mentions: reply
                        .competitor_mentions
                        .into_iter()
                        .filter(|(_, count)| *count > 0)
                        .collect(),
                    brand_rank: reply.brand_rank.filter(|rank| *rank > 0),
                })
            }
            TaskKind::Sentiment => {
                let reply: SentimentReply = serde_json::from_str(json).map_err(invalid)?;
                EnrichmentPayload::Sentiment(SentimentScore::from_score(reply.score))
            }
            TaskKind::Citation => {
                let reply: CitationReply = serde_json::from_str(json).map_err(invalid)?;
                EnrichmentPayload::Citation(CitationBreakdown {
                    citations: reply
                        .citations
                        .into_iter()
                        .map(|c| CategorizedCitation {
                            domain: domain_of(&c.url).unwrap_or_default(),
                            url: c.url,
                            category: c.category,
                        })
                        .collect(),
                })
            }
        };

        Ok(payload)
    }
}

fn names_of(brand: &BrandProfile) -> String {
    brand.names().collect::<Vec<_>>().join(" / ")
}

/// Extract the outermost JSON object from a reply (handles markdown fences)
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[derive(Debug, Deserialize)]
struct PositionReply {
    #[serde(default)]
    brand_mentions: u32,
    #[serde(default)]
    competitor_mentions: BTreeMap<String, u32>,
    brand_rank: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SentimentReply {
    score: f64,
}

#[derive(Debug, Deserialize)]
struct CitationReply {
    #[serde(default)]
    citations: Vec<CitationReplyItem>,
}

#[derive(Debug, Deserialize)]
struct CitationReplyItem {
    url: String,
    category: CitationCategory,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[async_trait]
impl<C: HttpClientTrait> Enricher for ModelEnricher<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn requires_credential(&self) -> bool {
        true
    }

    async fn enrich(
        &self,
        input: &EnrichmentInput,
        credential: Option<&Credential>,
    ) -> Result<EnrichmentPayload, ProviderError> {
        let credential =
            credential.ok_or_else(|| ProviderError::fatal("Model enricher needs a credential"))?;
        let prompt = self.build_prompt(input)?;

        debug!(enricher = %self.name, kind = %self.kind, model = %self.model, "Requesting enrichment");

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": "You extract structured brand signals and reply with JSON only." },
                { "role": "user", "content": prompt },
            ],
        });
        let auth = format!("Bearer {}", credential.secret());
        let url = format!("{}/v1/chat/completions", self.base_url);

        let json = self
            .client
            .post_json(
                &url,
                vec![
                    ("Authorization", auth.as_str()),
                    ("Content-Type", "application/json"),
                ],
                &body,
            )
            .await?;

        let response: CompletionResponse = serde_json::from_value(json)
            .map_err(|e| ProviderError::fatal(format!("Failed to parse response: {}", e)))?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::retryable("Empty enrichment reply"))?;

        self.parse_content(&content)
    }
}
