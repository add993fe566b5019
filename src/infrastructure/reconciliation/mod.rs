//! Background reconciliation of handed-off jobs

mod sweeper;

pub use sweeper::{ReconciliationSweeper, SweepReport, SweeperConfig};
