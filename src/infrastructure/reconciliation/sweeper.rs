//! Periodic reconciliation of handed-off jobs

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::polling::PendingJobRepository;
use crate::domain::DomainError;
use crate::infrastructure::services::CollectionServiceTrait;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Jobs resumed at the same time within one pass
    pub concurrency: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
            concurrency: 4,
        }
    }
}

/// Tally of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub still_pending: usize,
    pub errors: usize,
}

impl SweepReport {
    fn count(&mut self, outcome: &str) {
        match outcome {
            "completed" => self.completed += 1,
            "failed" => self.failed += 1,
            "timed_out" => self.timed_out += 1,
            "still_pending" => self.still_pending += 1,
            _ => {}
        }
    }
}

pub struct ReconciliationSweeper {
    service: Arc<dyn CollectionServiceTrait>,
    pending: Arc<dyn PendingJobRepository>,
    config: SweeperConfig,
}

impl std::fmt::Debug for ReconciliationSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationSweeper")
            .field("service", &self.service)
            .field("config", &self.config)
            .finish()
    }
}

impl ReconciliationSweeper {
    pub fn new(
        service: Arc<dyn CollectionServiceTrait>,
        pending: Arc<dyn PendingJobRepository>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            service,
            pending,
            config,
        }
    }

    /// Resumes every handed-off job once. A job that errors is counted and
    /// left for the next pass.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<SweepReport, DomainError> {
        let jobs = self.pending.list_handed_off().await?;
        let mut report = SweepReport {
            examined: jobs.len(),
            ..Default::default()
        };

        let outcomes: Vec<_> = stream::iter(jobs)
            .map(|job| {
                let service = self.service.clone();
                async move {
                    let handle = job.job_handle().clone();
                    (handle.clone(), service.resume_polling(&handle).await)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (handle, outcome) in outcomes {
            match outcome {
                Ok(resumed) => report.count(resumed.outcome),
                Err(e) => {
                    warn!(job_handle = %handle, error = %e, "Resume failed");
                    report.errors += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                completed = report.completed,
                failed = report.failed,
                timed_out = report.timed_out,
                still_pending = report.still_pending,
                errors = report.errors,
                "Reconciliation pass finished"
            );
        }

        Ok(report)
    }

    /// Sweeps every `interval_ms` until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        if !self.config.enabled {
            info!("Reconciliation sweeper disabled");
            return;
        }

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Reconciliation sweeper stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "Reconciliation pass failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use futures::stream::BoxStream;

    use crate::domain::batch::Batch;
    use crate::domain::collection::{fixtures, BatchId, CorrelationId};
    use crate::domain::orchestrator::{BatchSpec, CollectionOutcome};
    use crate::domain::polling::PendingJob;
    use crate::domain::provider::JobHandle;
    use crate::infrastructure::polling::StoragePendingJobRepository;
    use crate::infrastructure::services::{ResultView, ResumeReport};
    use crate::infrastructure::storage::InMemoryStorage;

    /// Answers resume calls from a script keyed by job handle
    #[derive(Debug, Default)]
    struct ScriptedService {
        outcomes: HashMap<String, &'static str>,
        jobs: HashMap<String, PendingJob>,
        resumed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CollectionServiceTrait for ScriptedService {
        async fn start(
            &self,
            _spec: BatchSpec,
        ) -> Result<(Batch, BoxStream<'static, CollectionOutcome>), DomainError> {
            unimplemented!()
        }

        async fn submit(&self, _spec: BatchSpec) -> Result<Batch, DomainError> {
            unimplemented!()
        }

        async fn progress(&self, _batch_id: &BatchId) -> Result<Batch, DomainError> {
            unimplemented!()
        }

        async fn cancel(&self, _batch_id: &BatchId) -> Result<Batch, DomainError> {
            unimplemented!()
        }

        async fn resume_polling(&self, handle: &JobHandle) -> Result<ResumeReport, DomainError> {
            self.resumed.lock().unwrap().push(handle.to_string());
            match self.outcomes.get(handle.as_str()) {
                Some(outcome) => Ok(ResumeReport {
                    outcome: *outcome,
                    job: self.jobs[handle.as_str()].clone(),
                    collection: None,
                }),
                None => Err(DomainError::provider("jobs-api", "unreachable")),
            }
        }

        async fn result(&self, _id: &CorrelationId) -> Result<ResultView, DomainError> {
            unimplemented!()
        }

        fn shutdown(&self) {}
    }

    fn job(handle: &str) -> PendingJob {
        PendingJob::new(
            JobHandle::new(handle),
            "jobs-api",
            "k1",
            fixtures::request("chat", 0),
            Utc::now(),
            1,
        )
    }

    async fn setup(
        script: &[(&str, Option<&'static str>)],
        config: SweeperConfig,
    ) -> (ReconciliationSweeper, Arc<ScriptedService>) {
        let pending = Arc::new(StoragePendingJobRepository::new(Arc::new(InMemoryStorage::new())));
        let mut service = ScriptedService::default();

        for (handle, outcome) in script {
            pending.save(job(handle)).await.unwrap();
            service.jobs.insert(handle.to_string(), job(handle));
            if let Some(outcome) = outcome {
                service.outcomes.insert(handle.to_string(), *outcome);
            }
        }

        let service = Arc::new(service);
        let sweeper = ReconciliationSweeper::new(service.clone(), pending, config);
        (sweeper, service)
    }

    #[tokio::test]
    async fn test_run_once_tallies_outcomes() {
        let script = [
            ("job-1", Some("completed")),
            ("job-2", Some("still_pending")),
            ("job-3", Some("timed_out")),
            ("job-4", None),
        ];
        let (sweeper, service) = setup(&script, SweeperConfig::default()).await;

        let report = sweeper.run_once().await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                examined: 4,
                completed: 1,
                failed: 0,
                timed_out: 1,
                still_pending: 1,
                errors: 1,
            }
        );
        assert_eq!(service.resumed.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_backlog() {
        let (sweeper, service) = setup(&[], SweeperConfig::default()).await;

        assert_eq!(sweeper.run_once().await.unwrap(), SweepReport::default());
        assert!(service.resumed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let config = SweeperConfig {
            interval_ms: 1_000,
            ..Default::default()
        };
        let (sweeper, service) = setup(&[("job-1", Some("still_pending"))], config).await;
        let sweeper = Arc::new(sweeper);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(sweeper.clone().run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // Ticks at 0, 1000 and 2000 ms
        assert_eq!(service.resumed.lock().unwrap().len(), 3);
    }
}
