//! Collector types and their provider bindings

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::chain::RetryConfig;
use crate::domain::DomainError;

static COLLECTOR_TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("collector type pattern is valid"));

pub const MAX_COLLECTOR_TYPE_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectorValidationError {
    #[error("Collector type cannot be empty")]
    EmptyType,

    #[error("Collector type too long: {length} characters (max {max})")]
    TypeTooLong { length: usize, max: usize },

    #[error("Invalid collector type '{value}': use lowercase letters, digits and hyphens")]
    InvalidTypeFormat { value: String },

    #[error("Collector '{collector}' has no provider bindings")]
    NoBindings { collector: String },

    #[error("Collector '{collector}' binds priority {priority} more than once")]
    DuplicatePriority { collector: String, priority: u32 },

    #[error("Binding '{provider}' has a zero timeout")]
    ZeroTimeout { provider: String },
}

impl From<CollectorValidationError> for DomainError {
    fn from(err: CollectorValidationError) -> Self {
        DomainError::validation(err.to_string())
    }
}

pub fn validate_collector_type(value: &str) -> Result<(), CollectorValidationError> {
    if value.is_empty() {
        return Err(CollectorValidationError::EmptyType);
    }

    if value.len() > MAX_COLLECTOR_TYPE_LENGTH {
        return Err(CollectorValidationError::TypeTooLong {
            length: value.len(),
            max: MAX_COLLECTOR_TYPE_LENGTH,
        });
    }

    if !COLLECTOR_TYPE_PATTERN.is_match(value) {
        return Err(CollectorValidationError::InvalidTypeFormat {
            value: value.to_string(),
        });
    }

    Ok(())
}

/// Name of a family of answer sources, e.g. `search-assistant`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectorType(String);

impl CollectorType {
    pub fn new(value: impl Into<String>) -> Result<Self, CollectorValidationError> {
        let value = value.into();
        validate_collector_type(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CollectorType {
    type Error = CollectorValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CollectorType> for String {
    fn from(value: CollectorType) -> Self {
        value.0
    }
}

impl fmt::Display for CollectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One provider slot in a collector's fallback chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBinding {
    provider: String,
    priority: u32,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_true")]
    fallback_on_failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry: Option<RetryConfig>,
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    2
}

impl ProviderBinding {
    pub fn new(provider: impl Into<String>, priority: u32) -> Self {
        Self {
            provider: provider.into(),
            priority,
            enabled: true,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            fallback_on_failure: true,
            retry: None,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_fallback_on_failure(mut self, fallback: bool) -> Self {
        self.fallback_on_failure = fallback;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    // Getters

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn fallback_on_failure(&self) -> bool {
        self.fallback_on_failure
    }

    pub fn retry(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }
}

/// A collector type with its bindings, sorted by ascending priority.
///
/// Only constructible through [`CollectorConfig::new`], so a config in hand
/// always has unique priorities and at least one binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorConfig {
    collector_type: CollectorType,
    bindings: Vec<ProviderBinding>,
}

impl CollectorConfig {
    pub fn new(
        collector_type: CollectorType,
        mut bindings: Vec<ProviderBinding>,
    ) -> Result<Self, CollectorValidationError> {
        if bindings.is_empty() {
            return Err(CollectorValidationError::NoBindings {
                collector: collector_type.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for binding in &bindings {
            if !seen.insert(binding.priority) {
                return Err(CollectorValidationError::DuplicatePriority {
                    collector: collector_type.to_string(),
                    priority: binding.priority,
                });
            }
            if binding.timeout_ms == 0 {
                return Err(CollectorValidationError::ZeroTimeout {
                    provider: binding.provider.clone(),
                });
            }
        }

        bindings.sort_by_key(|b| b.priority);

        Ok(Self {
            collector_type,
            bindings,
        })
    }

    pub fn collector_type(&self) -> &CollectorType {
        &self.collector_type
    }

    /// All bindings in ascending priority, disabled ones included
    pub fn bindings(&self) -> &[ProviderBinding] {
        &self.bindings
    }

    pub fn enabled_bindings(&self) -> impl Iterator<Item = &ProviderBinding> {
        self.bindings.iter().filter(|b| b.enabled)
    }
}
