//! Reconcile command - one sweep over handed-off jobs

use std::io::Write;

use anyhow::Context;
use clap::Args;

use crate::config::AppConfig;
use crate::domain::provider::JobHandle;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::services::CollectionServiceTrait;

#[derive(Args, Clone, Debug, Default)]
pub struct ReconcileArgs {
    /// Resume only this job instead of sweeping the whole backlog
    #[arg(long)]
    pub job: Option<String>,
}

pub async fn run(args: ReconcileArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_logging(&config.logging);

    let context = crate::create_app_context(&config).await?;
    let mut stdout = std::io::stdout();

    match args.job {
        Some(handle) => {
            let report = context
                .service
                .resume_polling(&JobHandle::new(handle))
                .await?;
            writeln!(stdout, "{}", serde_json::to_string(&report)?)?;
        }
        None => {
            let report = context.sweeper.run_once().await?;
            writeln!(stdout, "{}", serde_json::to_string(&report)?)?;
        }
    }

    Ok(())
}
