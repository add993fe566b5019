//! Collect command - runs one batch and prints each outcome as a JSON line

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use futures::StreamExt;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::collector::CollectorType;
use crate::domain::orchestrator::{BatchSpec, CollectionOutcome};
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::services::CollectionServiceTrait;

#[derive(Args, Clone, Debug)]
pub struct CollectArgs {
    #[arg(long)]
    pub brand_id: String,

    #[arg(long)]
    pub customer_id: String,

    /// Query text; repeat for several queries
    #[arg(long = "query", short = 'q')]
    pub queries: Vec<String>,

    /// File with one query per line
    #[arg(long)]
    pub queries_file: Option<PathBuf>,

    /// Collector types to ask, comma separated
    #[arg(long = "collector-types", short = 't', value_delimiter = ',', required = true)]
    pub collector_types: Vec<String>,

    #[arg(long, default_value = "en-US")]
    pub locale: String,

    #[arg(long, default_value = "US")]
    pub country: String,
}

impl CollectArgs {
    fn into_spec(self) -> anyhow::Result<BatchSpec> {
        let mut queries = self.queries;
        if let Some(path) = &self.queries_file {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            queries.extend(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }

        let collector_types = self
            .collector_types
            .into_iter()
            .map(CollectorType::new)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BatchSpec {
            brand_id: self.brand_id,
            customer_id: self.customer_id,
            queries,
            collector_types,
            locale: self.locale,
            country: self.country.to_uppercase(),
        })
    }
}

#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    handed_off: usize,
    failed: usize,
    cancelled: usize,
}

impl Tally {
    fn add(&mut self, outcome: &CollectionOutcome) {
        match outcome {
            CollectionOutcome::Completed { .. } => self.completed += 1,
            CollectionOutcome::HandedOff { .. } => self.handed_off += 1,
            CollectionOutcome::Failed { .. } => self.failed += 1,
            CollectionOutcome::Cancelled { .. } => self.cancelled += 1,
        }
    }
}

pub async fn run(args: CollectArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_logging(&config.logging);

    let spec = args.into_spec()?;
    let context = crate::create_app_context(&config).await?;
    let (batch, mut outcomes) = context.service.start(spec).await?;
    info!(batch_id = %batch.batch_id(), requests = batch.totals().total, "Collecting");

    let mut stdout = std::io::stdout();
    let mut tally = Tally::default();
    let mut interrupted = false;

    loop {
        tokio::select! {
            next = outcomes.next() => {
                let Some(outcome) = next else { break };
                tally.add(&outcome);
                writeln!(stdout, "{}", serde_json::to_string(&outcome)?)?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("Interrupted; cancelling remaining requests");
                interrupted = true;
                context.service.cancel(batch.batch_id()).await?;
            }
        }
    }

    info!(
        batch_id = %batch.batch_id(),
        completed = tally.completed,
        handed_off = tally.handed_off,
        failed = tally.failed,
        cancelled = tally.cancelled,
        "Collection finished"
    );

    if tally.handed_off > 0 {
        info!("Run `reconcile` later to settle handed-off jobs");
    }

    Ok(())
}
