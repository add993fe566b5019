//! Builds the key pool from configuration, resolving secrets from the
//! environment

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::{info, warn};

use super::InMemoryKeyPool;
use crate::domain::key_pool::{BackoffPolicy, Credential, OperationKind};
use crate::domain::DomainError;

/// One API key slot. The secret itself never appears in configuration,
/// only the name of the variable holding it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CredentialConfig {
    pub id: String,
    pub provider: String,
    pub operation: OperationKind,
    pub secret_env: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeyPoolConfig {
    pub default_backoff: BackoffPolicy,
    /// Overrides keyed by operation kind
    pub backoff: HashMap<OperationKind, BackoffPolicy>,
    pub credentials: Vec<CredentialConfig>,
}

impl KeyPoolConfig {
    pub fn build(&self) -> Result<InMemoryKeyPool, DomainError> {
        self.build_with(|name| std::env::var(name).ok())
    }

    /// Same as [`build`](Self::build) with a custom variable lookup
    pub fn build_with<F>(&self, lookup: F) -> Result<InMemoryKeyPool, DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut pool = InMemoryKeyPool::new().with_default_policy(self.default_backoff.clone());
        for (operation, policy) in &self.backoff {
            pool = pool.with_policy(*operation, policy.clone());
        }

        let mut seen = HashSet::new();
        for entry in &self.credentials {
            let slot = (entry.operation, entry.provider.as_str(), entry.id.as_str());
            if !seen.insert(slot) {
                return Err(DomainError::configuration(format!(
                    "Credential '{}' is listed twice for {}/{}",
                    entry.id, entry.operation, entry.provider
                )));
            }

            match lookup(&entry.secret_env).filter(|secret| !secret.trim().is_empty()) {
                Some(secret) => {
                    pool.add_credential(
                        entry.operation,
                        &entry.provider,
                        Credential::new(&entry.id, secret),
                    );
                }
                None => {
                    warn!(
                        credential_id = %entry.id,
                        provider = %entry.provider,
                        operation = %entry.operation,
                        env = %entry.secret_env,
                        "Credential secret not set, slot skipped"
                    );
                }
            }
        }

        info!(slots = pool.slot_count(), "Key pool loaded");
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::key_pool::KeyPool;

    fn entry(id: &str, operation: OperationKind, env: &str) -> CredentialConfig {
        CredentialConfig {
            id: id.to_string(),
            provider: "assistant-a".to_string(),
            operation,
            secret_env: env.to_string(),
        }
    }

    fn lookup(name: &str) -> Option<String> {
        match name {
            "KEY_ONE" => Some("sk-one".to_string()),
            "KEY_BLANK" => Some("  ".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_secrets_resolved_by_variable_name() {
        let config = KeyPoolConfig {
            credentials: vec![
                entry("one", OperationKind::Collection, "KEY_ONE"),
                entry("blank", OperationKind::Collection, "KEY_BLANK"),
                entry("missing", OperationKind::Collection, "KEY_MISSING"),
            ],
            ..Default::default()
        };

        let pool = config.build_with(lookup).unwrap();
        assert_eq!(pool.slot_count(), 1);

        let lease = pool.acquire(OperationKind::Collection, "assistant-a").unwrap();
        assert_eq!(lease.credential().id(), "one");
        assert_eq!(lease.credential().secret(), "sk-one");
    }

    #[test]
    fn test_operation_kinds_are_separate_partitions() {
        let config = KeyPoolConfig {
            credentials: vec![entry("one", OperationKind::SentimentScoring, "KEY_ONE")],
            ..Default::default()
        };

        let pool = config.build_with(lookup).unwrap();
        assert!(pool.acquire(OperationKind::Collection, "assistant-a").is_err());
        assert!(pool.acquire(OperationKind::SentimentScoring, "assistant-a").is_ok());
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let config = KeyPoolConfig {
            credentials: vec![
                entry("one", OperationKind::Collection, "KEY_ONE"),
                entry("one", OperationKind::Collection, "KEY_ONE"),
            ],
            ..Default::default()
        };

        assert!(config.build_with(lookup).is_err());
    }

    #[test]
    fn test_backoff_overrides_deserialize() {
        let config: KeyPoolConfig = serde_json::from_value(serde_json::json!({
            "backoff": { "sentiment_scoring": { "base_ms": 250 } },
            "credentials": []
        }))
        .unwrap();

        let policy = &config.backoff[&OperationKind::SentimentScoring];
        assert_eq!(policy.base_ms, 250);
        assert_eq!(policy.max_backoff_ms, BackoffPolicy::default().max_backoff_ms);
    }
}
