//! Enrichment tasks, their payloads and the merged record

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::collection::CorrelationId;
use crate::domain::key_pool::OperationKind;
use crate::domain::storage::{StorageEntity, TextKey};
use crate::domain::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Position,
    Sentiment,
    Citation,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [Self::Position, Self::Sentiment, Self::Citation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Sentiment => "sentiment",
            Self::Citation => "citation",
        }
    }

    /// Key pool partition this task draws credentials from
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            Self::Position => OperationKind::PositionExtraction,
            Self::Sentiment => OperationKind::SentimentScoring,
            Self::Citation => OperationKind::CitationCategorization,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TaskKind> for OperationKind {
    fn from(kind: TaskKind) -> Self {
        kind.operation_kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Succeeded)
                | (Self::InProgress, Self::Failed)
        )
    }
}

/// Brand and competitor mention counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCounts {
    pub brand_mentions: u32,
    pub competitor_mentions: BTreeMap<String, u32>,
    /// 1-based rank of the brand among all mentioned names by first
    /// appearance; `None` when the brand is not mentioned
    pub brand_rank: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// In `[-1.0, 1.0]`
    pub score: f64,
    pub label: SentimentLabel,
}

impl SentimentScore {
    /// Clamps `score` and derives the label with a +/-0.1 neutral band
    pub fn from_score(score: f64) -> Self {
        let score = if score.is_finite() {
            score.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let label = if score > 0.1 {
            SentimentLabel::Positive
        } else if score < -0.1 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };

        Self { score, label }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationCategory {
    Owned,
    Competitor,
    ThirdParty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizedCitation {
    pub url: String,
    pub domain: String,
    pub category: CitationCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationBreakdown {
    pub citations: Vec<CategorizedCitation>,
}

impl CitationBreakdown {
    pub fn count(&self, category: CitationCategory) -> usize {
        self.citations
            .iter()
            .filter(|c| c.category == category)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EnrichmentPayload {
    Position(PositionCounts),
    Sentiment(SentimentScore),
    Citation(CitationBreakdown),
}

impl EnrichmentPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Position(_) => TaskKind::Position,
            Self::Sentiment(_) => TaskKind::Sentiment,
            Self::Citation(_) => TaskKind::Citation,
        }
    }
}

/// One enrichment of one collected result, keyed `{result_id}:{kind}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentTask {
    key: TextKey,
    collector_result_id: CorrelationId,
    task_kind: TaskKind,
    status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result_payload: Option<EnrichmentPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl EnrichmentTask {
    pub fn key_for(result_id: &CorrelationId, kind: TaskKind) -> TextKey {
        TextKey::new(format!("{}:{}", result_id, kind))
    }

    pub fn pending(result_id: CorrelationId, kind: TaskKind) -> Self {
        Self {
            key: Self::key_for(&result_id, kind),
            collector_result_id: result_id,
            task_kind: kind,
            status: TaskStatus::Pending,
            provider_used: None,
            result_payload: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::conflict(format!(
                "task {} cannot move from {:?} to {:?}",
                self.key, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::InProgress)
    }

    pub fn succeed(
        &mut self,
        provider: impl Into<String>,
        payload: EnrichmentPayload,
    ) -> Result<(), DomainError> {
        self.transition(TaskStatus::Succeeded)?;
        self.provider_used = Some(provider.into());
        self.result_payload = Some(payload);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn collector_result_id(&self) -> &CorrelationId {
        &self.collector_result_id
    }

    pub fn task_kind(&self) -> TaskKind {
        self.task_kind
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn provider_used(&self) -> Option<&str> {
        self.provider_used.as_deref()
    }

    pub fn result_payload(&self) -> Option<&EnrichmentPayload> {
        self.result_payload.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl StorageEntity for EnrichmentTask {
    type Key = TextKey;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// Structured signals for one result; a failed task leaves its field empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    result_id: CorrelationId,
    pub position: Option<PositionCounts>,
    pub sentiment: Option<SentimentScore>,
    pub citations: Option<CitationBreakdown>,
    completed_at: DateTime<Utc>,
}

impl EnrichedRecord {
    pub fn merge<'a>(
        result_id: CorrelationId,
        tasks: impl IntoIterator<Item = &'a EnrichmentTask>,
    ) -> Self {
        let mut record = Self {
            result_id,
            position: None,
            sentiment: None,
            citations: None,
            completed_at: Utc::now(),
        };

        for task in tasks {
            if task.status != TaskStatus::Succeeded {
                continue;
            }
            match task.result_payload.clone() {
                Some(EnrichmentPayload::Position(p)) => record.position = Some(p),
                Some(EnrichmentPayload::Sentiment(s)) => record.sentiment = Some(s),
                Some(EnrichmentPayload::Citation(c)) => record.citations = Some(c),
                None => {}
            }
        }

        record
    }

    pub fn result_id(&self) -> &CorrelationId {
        &self.result_id
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

impl StorageEntity for EnrichedRecord {
    type Key = CorrelationId;

    fn key(&self) -> &Self::Key {
        &self.result_id
    }
}
