//! Orchestration domain - batches of queries across collector types

mod orchestrator;
mod outcome;

pub use orchestrator::{CollectionOrchestrator, OrchestratorConfig, PreparedBatch};
pub use outcome::{BatchSpec, CollectionOutcome};
