use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::http_client::HttpClient;
use super::{AsyncJobAdapter, ChatCompletionsAdapter, MessagesAdapter};
use crate::domain::provider::{ProviderAdapter, ProviderRegistry};
use crate::domain::DomainError;

/// Wire dialect of an upstream answer source
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderKind {
    ChatCompletions {
        model: String,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Messages {
        model: String,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    AsyncJob,
}

/// One named provider as it appears in configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

/// Builds provider adapters from configuration
#[derive(Debug)]
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>, DomainError> {
        let client = HttpClient::with_timeout(Duration::from_millis(config.request_timeout_ms))?;

        match &config.kind {
            ProviderKind::ChatCompletions { model, max_tokens } => {
                let mut adapter = ChatCompletionsAdapter::new(&config.name, client, model);
                if let Some(base_url) = &config.base_url {
                    adapter = adapter.with_base_url(base_url);
                }
                if let Some(max_tokens) = max_tokens {
                    adapter = adapter.with_max_tokens(*max_tokens);
                }
                Ok(Arc::new(adapter))
            }

            ProviderKind::Messages { model, max_tokens } => {
                let mut adapter = MessagesAdapter::new(&config.name, client, model);
                if let Some(base_url) = &config.base_url {
                    adapter = adapter.with_base_url(base_url);
                }
                if let Some(max_tokens) = max_tokens {
                    adapter = adapter.with_max_tokens(*max_tokens);
                }
                Ok(Arc::new(adapter))
            }

            ProviderKind::AsyncJob => {
                let base_url = config.base_url.as_deref().ok_or_else(|| {
                    DomainError::configuration(format!(
                        "Provider '{}' of type async_job requires base_url",
                        config.name
                    ))
                })?;
                Ok(Arc::new(AsyncJobAdapter::new(&config.name, client, base_url)))
            }
        }
    }

    /// Build a registry holding one adapter per configured provider
    pub fn build_registry(configs: &[ProviderConfig]) -> Result<ProviderRegistry, DomainError> {
        let mut registry = ProviderRegistry::new();

        for config in configs {
            if registry.get(&config.name).is_some() {
                return Err(DomainError::configuration(format!(
                    "Provider '{}' is configured more than once",
                    config.name
                )));
            }
            registry.register(Self::create(config)?);
        }

        Ok(registry)
    }
}
