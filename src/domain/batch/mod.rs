//! Batch domain - per-batch progress tracking

mod entity;
mod repository;

pub use entity::{Batch, BatchEvent, BatchStatus, TypeCounters};
pub use repository::BatchRepository;

#[cfg(test)]
pub use repository::MockBatchRepository;
