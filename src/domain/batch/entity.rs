//! Collection batches and their progress counters

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::collection::BatchId;
use crate::domain::collector::CollectorType;
use crate::domain::storage::StorageEntity;

/// Something that happened to one request of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchEvent {
    Completed,
    Failed,
    HandedOff,
    Cancelled,
    /// A handed-off job settled during reconciliation
    HandoffSucceeded,
    HandoffFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounters {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub handed_off: u32,
    pub cancelled: u32,
}

impl TypeCounters {
    pub fn settled(&self) -> u32 {
        self.completed + self.failed + self.handed_off + self.cancelled
    }

    pub fn in_flight(&self) -> u32 {
        self.total.saturating_sub(self.settled())
    }

    fn apply(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::Completed => self.completed += 1,
            BatchEvent::Failed => self.failed += 1,
            BatchEvent::HandedOff => self.handed_off += 1,
            BatchEvent::Cancelled => self.cancelled += 1,
            BatchEvent::HandoffSucceeded => {
                self.handed_off = self.handed_off.saturating_sub(1);
                self.completed += 1;
            }
            BatchEvent::HandoffFailed => {
                self.handed_off = self.handed_off.saturating_sub(1);
                self.failed += 1;
            }
        }
    }

    fn add(&mut self, other: &TypeCounters) {
        self.total += other.total;
        self.completed += other.completed;
        self.failed += other.failed;
        self.handed_off += other.handed_off;
        self.cancelled += other.cancelled;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Running,
    /// Every request settled; some may still be handed off
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    batch_id: BatchId,
    brand_id: String,
    customer_id: String,
    counters: BTreeMap<CollectorType, TypeCounters>,
    cancelled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Batch {
    /// A batch of `query_count` queries sent to each of `collector_types`
    pub fn new(
        batch_id: BatchId,
        brand_id: impl Into<String>,
        customer_id: impl Into<String>,
        query_count: usize,
        collector_types: &[CollectorType],
    ) -> Self {
        let counters = collector_types
            .iter()
            .map(|c| {
                (
                    c.clone(),
                    TypeCounters {
                        total: query_count as u32,
                        ..Default::default()
                    },
                )
            })
            .collect();
        let now = Utc::now();

        Self {
            batch_id,
            brand_id: brand_id.into(),
            customer_id: customer_id.into(),
            counters,
            cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn brand_id(&self) -> &str {
        &self.brand_id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn counters(&self) -> &BTreeMap<CollectorType, TypeCounters> {
        &self.counters
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn totals(&self) -> TypeCounters {
        let mut totals = TypeCounters::default();
        for counters in self.counters.values() {
            totals.add(counters);
        }
        totals
    }

    pub fn status(&self) -> BatchStatus {
        if self.cancelled {
            BatchStatus::Cancelled
        } else if self.totals().in_flight() == 0 {
            BatchStatus::Finished
        } else {
            BatchStatus::Running
        }
    }

    /// Applies one request event; unknown collector types are ignored
    pub fn record(&mut self, collector_type: &CollectorType, event: BatchEvent) -> bool {
        let Some(counters) = self.counters.get_mut(collector_type) else {
            return false;
        };
        counters.apply(event);
        self.updated_at = Utc::now();
        true
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.updated_at = Utc::now();
    }
}

impl StorageEntity for Batch {
    type Key = BatchId;

    fn key(&self) -> &Self::Key {
        &self.batch_id
    }
}
