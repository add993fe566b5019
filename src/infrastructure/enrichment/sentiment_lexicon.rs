//! Lexicon sentiment scorer, the last resort behind the model-backed
//! sentiment enrichers

use async_trait::async_trait;

use crate::domain::enrichment::{
    Enricher, EnrichmentInput, EnrichmentPayload, SentimentScore, TaskKind,
};
use crate::domain::key_pool::Credential;
use crate::domain::provider::ProviderError;

/// Word weights for how an answer talks about a product or vendor.
///
/// Keys are lowercase single words. Values in `(0.0, 1.0]` are positive,
/// in `[-1.0, 0.0)` are negative.
pub(crate) const LEXICON: &[(&str, f32)] = &[
    // Positive signals
    ("best", 0.5),
    ("excellent", 0.5),
    ("great", 0.4),
    ("good", 0.3),
    ("recommend", 0.4),
    ("recommended", 0.4),
    ("reliable", 0.4),
    ("trusted", 0.4),
    ("popular", 0.3),
    ("leading", 0.4),
    ("favorite", 0.4),
    ("favourite", 0.4),
    ("affordable", 0.3),
    ("comfortable", 0.3),
    ("durable", 0.3),
    ("innovative", 0.3),
    ("quality", 0.3),
    ("love", 0.5),
    ("praised", 0.4),
    ("standout", 0.4),
    // Negative signals
    ("worst", -0.6),
    ("bad", -0.4),
    ("poor", -0.4),
    ("terrible", -0.6),
    ("avoid", -0.5),
    ("expensive", -0.3),
    ("overpriced", -0.5),
    ("unreliable", -0.5),
    ("complaints", -0.4),
    ("complaint", -0.4),
    ("issues", -0.3),
    ("problem", -0.3),
    ("problems", -0.3),
    ("recall", -0.7),
    ("lawsuit", -0.5),
    ("scam", -0.8),
    ("disappointing", -0.5),
    ("outdated", -0.3),
    ("lacks", -0.3),
    ("limited", -0.2),
];

/// Sums matching word weights and clamps the result to `[-1.0, 1.0]`.
/// Returns `0.0` for empty or unknown text.
#[must_use]
pub fn lexicon_score(text: &str) -> f32 {
    let mut score = 0.0_f32;
    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        if let Some(&(_, weight)) = LEXICON.iter().find(|(lex_word, _)| *lex_word == w) {
            score += weight;
        }
    }
    score.clamp(-1.0, 1.0)
}

/// Sentences of `text` mentioning any of `names`, case-insensitively
fn mentioning<'t>(text: &'t str, names: &[String]) -> Vec<&'t str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            names.iter().any(|name| lower.contains(name.as_str()))
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct SentimentLexiconEnricher;

impl SentimentLexiconEnricher {
    pub const NAME: &'static str = "sentiment-lexicon";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Enricher for SentimentLexiconEnricher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Sentiment
    }

    fn requires_credential(&self) -> bool {
        false
    }

    /// With a brand profile only sentences naming the brand count; an
    /// answer that never names it scores neutral. Without one the whole
    /// answer is scored.
    async fn enrich(
        &self,
        input: &EnrichmentInput,
        _credential: Option<&Credential>,
    ) -> Result<EnrichmentPayload, ProviderError> {
        let score = match &input.brand {
            Some(brand) => {
                let names: Vec<String> = brand.names().map(str::to_lowercase).collect();
                lexicon_score(&mentioning(input.answer(), &names).concat())
            }
            None => lexicon_score(input.answer()),
        };

        Ok(EnrichmentPayload::Sentiment(SentimentScore::from_score(
            f64::from(score),
        )))
    }
}
