//! Scoring domain - fans each collected result out to its enrichers

mod coordinator;

pub use coordinator::{ScoringConfig, ScoringCoordinator, ScoringOutcome};
