//! Credential slots and backoff policy

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a credential is being used for. Every slot belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Collection,
    PositionExtraction,
    SentimentScoring,
    CitationCategorization,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        Self::Collection,
        Self::PositionExtraction,
        Self::SentimentScoring,
        Self::CitationCategorization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::PositionExtraction => "position_extraction",
            Self::SentimentScoring => "sentiment_scoring",
            Self::CitationCategorization => "citation_categorization",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    id: String,
    secret: String,
}

impl Credential {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Identity of a credential slot. The operation kind is not optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    operation: OperationKind,
    provider: String,
    credential_id: String,
}

impl SlotKey {
    pub fn new(
        operation: OperationKind,
        provider: impl Into<String>,
        credential_id: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            provider: provider.into(),
            credential_id: credential_id.into(),
        }
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.operation, self.provider, self.credential_id)
    }
}

/// A credential handed out by the pool, tagged with the slot it came from
#[derive(Debug, Clone)]
pub struct CredentialLease {
    key: SlotKey,
    credential: Credential,
}

impl CredentialLease {
    pub fn new(key: SlotKey, credential: Credential) -> Self {
        Self { key, credential }
    }

    pub fn key(&self) -> &SlotKey {
        &self.key
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyPoolError {
    #[error("no credentials configured for {operation} on provider '{provider}'")]
    NoCredentials {
        operation: OperationKind,
        provider: String,
    },

    #[error("every credential for {operation} on provider '{provider}' is backing off")]
    Backoff {
        operation: OperationKind,
        provider: String,
        retry_after: Duration,
    },
}

/// Per-operation rate-limit backoff settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub cap_exponent: u32,
    pub max_backoff_ms: u64,
    /// Hits further apart than this start counting from zero again
    pub hit_window_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_exponent: 6,
            max_backoff_ms: 120_000,
            hit_window_ms: 300_000,
        }
    }
}

impl BackoffPolicy {
    pub fn hit_window(&self) -> Duration {
        Duration::from_millis(self.hit_window_ms)
    }

    /// Backoff after the `hits`-th consecutive rate limit:
    /// `base * 2^min(hits, cap_exponent)`, never more than `max_backoff`.
    pub fn delay_for_hits(&self, hits: u32) -> Duration {
        let exponent = hits.min(self.cap_exponent).min(32);
        let delay = self.base_ms.saturating_mul(1u64 << exponent);

        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}
