//! Infrastructure layer - External service implementations

pub mod attempt;
pub mod batch;
pub mod brand;
pub mod collection;
pub mod enrichment;
pub mod key_pool;
pub mod logging;
pub mod observability;
pub mod polling;
pub mod providers;
pub mod reconciliation;
pub mod services;
pub mod storage;
