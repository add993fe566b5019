use serde::Deserialize;

use crate::domain::brand::BrandProfile;
use crate::domain::chain::RetryConfig;
use crate::domain::collector::{CollectorConfig, CollectorType, ProviderBinding};
use crate::domain::orchestrator::OrchestratorConfig;
use crate::domain::polling::PollingConfig;
use crate::domain::scoring::ScoringConfig;
use crate::domain::DomainError;
use crate::infrastructure::enrichment::EnrichmentConfig;
use crate::infrastructure::key_pool::KeyPoolConfig;
use crate::infrastructure::logging::LoggingConfig;
use crate::infrastructure::observability::ObservabilityConfig;
use crate::infrastructure::providers::ProviderConfig;
use crate::infrastructure::reconciliation::SweeperConfig;
use crate::infrastructure::storage::StorageConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub observability: ObservabilityConfig,
    pub storage: StorageConfig,
    pub providers: Vec<ProviderConfig>,
    pub collectors: Vec<CollectorSection>,
    pub key_pool: KeyPoolConfig,
    pub polling: PollingConfig,
    /// Used by bindings without their own retry policy
    pub retry: RetryConfig,
    pub orchestrator: OrchestratorConfig,
    pub scoring: ScoringConfig,
    pub enrichment: EnrichmentConfig,
    pub brands: Vec<BrandProfile>,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// One `[[collectors]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSection {
    #[serde(rename = "type")]
    pub collector_type: CollectorType,
    pub bindings: Vec<ProviderBinding>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validated collector configs; every binding must name a configured
    /// provider
    pub fn collector_configs(&self) -> Result<Vec<CollectorConfig>, DomainError> {
        let mut configs = Vec::with_capacity(self.collectors.len());

        for section in &self.collectors {
            if let Some(binding) = section
                .bindings
                .iter()
                .find(|b| !self.providers.iter().any(|p| p.name == b.provider()))
            {
                return Err(DomainError::configuration(format!(
                    "Collector '{}' binds unknown provider '{}'",
                    section.collector_type,
                    binding.provider()
                )));
            }

            configs.push(CollectorConfig::new(
                section.collector_type.clone(),
                section.bindings.clone(),
            )?);
        }

        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
        assert!(config.providers.is_empty());
        assert!(config.sweeper.enabled);
        assert!(config.collector_configs().unwrap().is_empty());
    }

    #[test]
    fn test_shipped_defaults_are_consistent() {
        let config = parse(include_str!("../../config/default.toml"));

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.key_pool.credentials.len(), 2);
        assert_eq!(config.brands[0].competitors.len(), 2);
        assert_eq!(config.collector_configs().unwrap().len(), 1);
        assert_eq!(config.polling, PollingConfig::default());
    }

    #[test]
    fn test_collectors_and_providers() {
        let config = parse(
            r#"
            [[providers]]
            name = "assistant-a"
            type = "chat_completions"
            model = "gpt-4o-mini"

            [[providers]]
            name = "jobs-api"
            type = "async_job"
            base_url = "https://jobs.example.com"

            [[collectors]]
            type = "chat"
            bindings = [
                { provider = "jobs-api", priority = 2 },
                { provider = "assistant-a", priority = 1, max_retries = 0 },
            ]
            "#,
        );

        let collectors = config.collector_configs().unwrap();
        assert_eq!(collectors.len(), 1);

        let order: Vec<&str> = collectors[0]
            .bindings()
            .iter()
            .map(|b| b.provider())
            .collect();
        assert_eq!(order, vec!["assistant-a", "jobs-api"]);
        assert_eq!(collectors[0].bindings()[0].max_retries(), 0);
    }

    #[test]
    fn test_binding_to_unknown_provider_rejected() {
        let config = parse(
            r#"
            [[collectors]]
            type = "chat"
            bindings = [{ provider = "ghost", priority = 1 }]
            "#,
        );

        let err = config.collector_configs().unwrap_err();
        assert!(matches!(err, DomainError::Configuration { .. }));
    }

    #[test]
    fn test_invalid_collector_type_fails_to_parse() {
        let result: Result<AppConfig, _> = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [[collectors]]
                type = "Chat Bot"
                bindings = []
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize();

        assert!(result.is_err());
    }
}
