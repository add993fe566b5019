//! CLI module for the answer collector
//!
//! - `serve`: HTTP API with the background reconciliation sweeper
//! - `collect`: run one batch, printing outcomes as JSON lines
//! - `reconcile`: resume handed-off jobs once and exit

pub mod collect;
pub mod reconcile;
pub mod serve;

use clap::{Parser, Subcommand};

/// PMP Answer Collector - brand answer collection across AI providers
#[derive(Parser)]
#[command(name = "pmp-answer-collector")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API and reconciliation sweeper
    Serve,

    /// Collect one batch and write outcomes to stdout
    Collect(collect::CollectArgs),

    /// Resume handed-off jobs once
    Reconcile(reconcile::ReconcileArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_reconcile_single_job() {
        let cli = Cli::parse_from(["pmp-answer-collector", "reconcile", "--job", "job-7"]);

        match cli.command {
            Command::Reconcile(args) => assert_eq!(args.job.as_deref(), Some("job-7")),
            _ => panic!("expected reconcile"),
        }
    }
}
