use clap::Parser;
use pmp_answer_collector::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cli::serve::run().await,
        Command::Collect(args) => cli::collect::run(args).await,
        Command::Reconcile(args) => cli::reconcile::run(args).await,
    }
}
