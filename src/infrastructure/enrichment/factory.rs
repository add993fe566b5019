use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{CitationRulesEnricher, ModelEnricher, PositionRulesEnricher, SentimentLexiconEnricher};
use crate::domain::enrichment::{Enricher, TaskKind};
use crate::domain::DomainError;
use crate::infrastructure::providers::HttpClient;

/// How one enricher is built
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnricherKind {
    /// Chat completions model; `name` is the key pool provider
    Model {
        name: String,
        model: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default = "default_request_timeout_ms")]
        request_timeout_ms: u64,
    },
    Rules,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnricherConfig {
    pub task: TaskKind,
    #[serde(flatten)]
    pub kind: EnricherKind,
}

/// Enricher chains in priority order; entries of the same task keep their
/// listed order. An empty list means rule-based enrichment only.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enrichers: Vec<EnricherConfig>,
}

#[derive(Debug)]
pub struct EnricherFactory;

impl EnricherFactory {
    pub fn create(config: &EnricherConfig) -> Result<Arc<dyn Enricher>, DomainError> {
        match &config.kind {
            EnricherKind::Model {
                name,
                model,
                base_url,
                request_timeout_ms,
            } => {
                let client = HttpClient::with_timeout(Duration::from_millis(*request_timeout_ms))?;
                let mut enricher = ModelEnricher::new(name, config.task, client, model);
                if let Some(base_url) = base_url {
                    enricher = enricher.with_base_url(base_url);
                }
                Ok(Arc::new(enricher))
            }
            EnricherKind::Rules => Ok(Self::rules(config.task)),
        }
    }

    pub fn rules(task: TaskKind) -> Arc<dyn Enricher> {
        match task {
            TaskKind::Position => Arc::new(PositionRulesEnricher::new()),
            TaskKind::Sentiment => Arc::new(SentimentLexiconEnricher::new()),
            TaskKind::Citation => Arc::new(CitationRulesEnricher::new()),
        }
    }

    /// All configured enrichers, or one rule-based enricher per task kind
    /// when nothing is configured
    pub fn build_all(config: &EnrichmentConfig) -> Result<Vec<Arc<dyn Enricher>>, DomainError> {
        if config.enrichers.is_empty() {
            return Ok(TaskKind::ALL.into_iter().map(Self::rules).collect());
        }

        config.enrichers.iter().map(Self::create).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_falls_back_to_rules() {
        let enrichers = EnricherFactory::build_all(&EnrichmentConfig::default()).unwrap();

        let names: Vec<&str> = enrichers.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                PositionRulesEnricher::NAME,
                SentimentLexiconEnricher::NAME,
                CitationRulesEnricher::NAME
            ]
        );
        assert!(enrichers.iter().all(|e| !e.requires_credential()));
    }

    #[test]
    fn test_configured_chain_keeps_order() {
        let config: EnrichmentConfig = serde_json::from_value(serde_json::json!({
            "enrichers": [
                { "task": "sentiment", "type": "model", "name": "enrich-primary", "model": "gpt-4o-mini" },
                { "task": "sentiment", "type": "model", "name": "enrich-secondary", "model": "m2",
                  "base_url": "https://llm.internal.example" },
                { "task": "sentiment", "type": "rules" }
            ]
        }))
        .unwrap();

        let enrichers = EnricherFactory::build_all(&config).unwrap();
        let names: Vec<&str> = enrichers.iter().map(|e| e.name()).collect();

        assert_eq!(
            names,
            vec!["enrich-primary", "enrich-secondary", SentimentLexiconEnricher::NAME]
        );
        assert!(enrichers[0].requires_credential());
        assert!(enrichers.iter().all(|e| e.kind() == TaskKind::Sentiment));
    }
}
