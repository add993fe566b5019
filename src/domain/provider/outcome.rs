//! Normalized provider inputs, answers and failure classes

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::collection::Citation;

/// What an adapter needs to ask one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderQuery {
    pub query_text: String,
    pub locale: String,
    pub country: String,
}

/// Normalized answer, independent of the upstream wire format
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderAnswer {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ProviderAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Opaque handle to a job accepted by a trigger-and-poll provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Successful outcome of a submit call
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Completed(ProviderAnswer),
    /// The provider queued the work; poll the handle for the answer
    Accepted(JobHandle),
}

/// State of an accepted job as reported by one poll
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Running,
    Completed(ProviderAnswer),
    Failed(String),
}

/// Failure classes every adapter maps its errors into
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("retryable failure: {message}")]
    Retryable { message: String },

    #[error("fatal failure: {message}")]
    Fatal { message: String },

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
}

impl ProviderError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable { message } | Self::Fatal { message } => message,
            Self::RateLimited { message, .. } => message,
        }
    }
}
