//! Chain executor - walks a collector's provider bindings with retry and fallback

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::outcome::{ChainError, ChainOutcome, ResumeOutcome};
use super::retry::RetryConfig;
use crate::domain::attempt::{AttemptLog, AttemptStatus, ProviderAttempt};
use crate::domain::collection::{CollectionRequest, CollectorResult, CorrelationId};
use crate::domain::collector::{CollectorConfig, ProviderBinding};
use crate::domain::key_pool::{CredentialLease, KeyPool, KeyPoolError, OperationKind, SlotKey};
use crate::domain::polling::{
    AsyncPoller, PendingJob, PendingJobRepository, PendingJobStatus, PollOutcome, PollTier,
};
use crate::domain::provider::{
    JobHandle, ProviderAdapter, ProviderAnswer, ProviderError, ProviderRegistry, Submission,
};
use crate::domain::DomainError;

/// What to do after a binding is done with
enum BindingVerdict {
    Finished(ChainOutcome),
    NextBinding,
    Stop,
    Cancelled,
}

/// Numbers and persists attempts of one request as they happen
struct AttemptWriter<'a> {
    request_id: &'a CorrelationId,
    log: &'a dyn AttemptLog,
    next_sequence: u32,
    recorded: Vec<ProviderAttempt>,
}

impl<'a> AttemptWriter<'a> {
    fn new(request_id: &'a CorrelationId, log: &'a dyn AttemptLog) -> Self {
        Self {
            request_id,
            log,
            next_sequence: 0,
            recorded: Vec::new(),
        }
    }

    fn begin(&mut self, provider: &str, credential_id: Option<&str>) -> ProviderAttempt {
        let attempt = ProviderAttempt::start(self.request_id.clone(), self.next_sequence, provider);
        self.next_sequence += 1;

        match credential_id {
            Some(id) => attempt.with_credential_id(id),
            None => attempt,
        }
    }

    async fn record(&mut self, attempt: ProviderAttempt) -> Result<(), ChainError> {
        debug!(
            sequence = attempt.sequence(),
            provider = attempt.provider(),
            status = %attempt.status(),
            "Recording provider attempt"
        );
        self.log.append(attempt.clone()).await?;
        self.recorded.push(attempt);
        Ok(())
    }

    fn into_attempts(self) -> Vec<ProviderAttempt> {
        self.recorded
    }
}

/// One async lock per job handle being resumed
#[derive(Default)]
struct ResumeLocks {
    locks: Mutex<HashMap<JobHandle, Arc<AsyncMutex<()>>>>,
}

impl ResumeLocks {
    fn for_handle(&self, handle: &JobHandle) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(handle.clone()).or_default().clone()
    }
}

/// Executes collection requests against a collector's ordered bindings.
///
/// Bindings run in ascending priority; the first success ends the chain.
/// Every attempt is appended to the attempt log the moment it has an
/// outcome, so a chain that ends in exhaustion still leaves its trail.
pub struct ChainExecutor {
    providers: ProviderRegistry,
    key_pool: Arc<dyn KeyPool>,
    attempts: Arc<dyn AttemptLog>,
    pending_jobs: Arc<dyn PendingJobRepository>,
    poller: Arc<AsyncPoller>,
    default_retry: RetryConfig,
    resume_locks: ResumeLocks,
}

impl std::fmt::Debug for ChainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainExecutor")
            .field("providers", &self.providers.names())
            .field("default_retry", &self.default_retry)
            .finish()
    }
}

impl ChainExecutor {
    pub fn new(
        providers: ProviderRegistry,
        key_pool: Arc<dyn KeyPool>,
        attempts: Arc<dyn AttemptLog>,
        pending_jobs: Arc<dyn PendingJobRepository>,
        poller: Arc<AsyncPoller>,
    ) -> Self {
        Self {
            providers,
            key_pool,
            attempts,
            pending_jobs,
            poller,
            default_retry: RetryConfig::default(),
            resume_locks: ResumeLocks::default(),
        }
    }

    pub fn with_default_retry(mut self, retry: RetryConfig) -> Self {
        self.default_retry = retry;
        self
    }

    pub fn poller(&self) -> &AsyncPoller {
        &self.poller
    }

    /// Runs one request through the collector's fallback chain
    #[instrument(
        skip_all,
        fields(
            request_id = %request.correlation_id(),
            collector = %config.collector_type()
        )
    )]
    pub async fn execute(
        &self,
        request: &CollectionRequest,
        config: &CollectorConfig,
        cancel: &CancellationToken,
    ) -> Result<ChainOutcome, ChainError> {
        let mut writer = AttemptWriter::new(request.correlation_id(), self.attempts.as_ref());

        for binding in config.enabled_bindings() {
            let verdict = self.run_binding(request, binding, cancel, &mut writer).await?;

            match verdict {
                BindingVerdict::Finished(outcome) => {
                    if let ChainOutcome::Completed(result) = &outcome {
                        info!(
                            provider = result.provider_used(),
                            attempts = writer.recorded.len(),
                            "Collection request completed"
                        );
                    }
                    return Ok(outcome);
                }
                BindingVerdict::NextBinding => continue,
                BindingVerdict::Stop => {
                    debug!(provider = binding.provider(), "Binding stops the chain");
                    break;
                }
                BindingVerdict::Cancelled => {
                    info!("Collection request cancelled before next attempt");
                    return Err(ChainError::Cancelled {
                        request_id: request.correlation_id().clone(),
                        attempts: writer.into_attempts(),
                    });
                }
            }
        }

        let attempts = writer.into_attempts();
        warn!(attempts = attempts.len(), "All provider bindings exhausted");

        Err(ChainError::Exhausted {
            request_id: request.correlation_id().clone(),
            attempts,
        })
    }

    /// Attempts one binding, retrying retryable failures
    async fn run_binding(
        &self,
        request: &CollectionRequest,
        binding: &ProviderBinding,
        cancel: &CancellationToken,
        writer: &mut AttemptWriter<'_>,
    ) -> Result<BindingVerdict, ChainError> {
        let provider = binding.provider();
        let on_failure = if binding.fallback_on_failure() {
            BindingVerdict::NextBinding
        } else {
            BindingVerdict::Stop
        };

        let Some(adapter) = self.providers.get(provider) else {
            if cancel.is_cancelled() {
                return Ok(BindingVerdict::Cancelled);
            }
            let attempt = writer
                .begin(provider, None)
                .finish(AttemptStatus::FatalFailure)
                .with_error(format!("no adapter registered for provider '{}'", provider));
            writer.record(attempt).await?;
            return Ok(BindingVerdict::NextBinding);
        };

        let retry = binding.retry().unwrap_or(&self.default_retry);
        let query = request.to_query();
        let mut retries = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Ok(BindingVerdict::Cancelled);
            }

            let lease = match self.key_pool.acquire(OperationKind::Collection, provider) {
                Ok(lease) => lease,
                Err(KeyPoolError::NoCredentials { .. }) => {
                    let attempt = writer
                        .begin(provider, None)
                        .finish(AttemptStatus::FatalFailure)
                        .with_error("no credentials configured");
                    writer.record(attempt).await?;
                    return Ok(BindingVerdict::NextBinding);
                }
                Err(err @ KeyPoolError::Backoff { .. }) => {
                    let attempt = writer
                        .begin(provider, None)
                        .finish(AttemptStatus::RateLimited)
                        .with_error(err.to_string());
                    writer.record(attempt).await?;
                    return Ok(on_failure);
                }
            };

            let attempt = writer.begin(provider, Some(lease.credential().id()));
            let submitted = timeout(binding.timeout(), adapter.submit(&query, lease.credential()))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::retryable(format!(
                        "no response within {}ms",
                        binding.timeout().as_millis()
                    )))
                });

            match submitted {
                Ok(Submission::Completed(answer)) => {
                    self.key_pool.report_success(&lease);
                    let attempt = attempt
                        .finish(AttemptStatus::Success)
                        .with_payload(answer_payload(&answer));
                    writer.record(attempt).await?;

                    let result = CollectorResult::from_answer(request, provider, answer);
                    return Ok(BindingVerdict::Finished(ChainOutcome::Completed(result)));
                }
                Ok(Submission::Accepted(handle)) => {
                    self.key_pool.report_success(&lease);
                    let attempt = attempt
                        .finish(AttemptStatus::AcceptedAsync)
                        .with_payload(serde_json::json!({ "job_handle": handle.as_str() }));
                    writer.record(attempt).await?;

                    return self
                        .await_accepted_job(request, adapter.as_ref(), handle, &lease, writer)
                        .await;
                }
                Err(ProviderError::RateLimited {
                    message,
                    retry_after,
                }) => {
                    let backoff = self.key_pool.report_rate_limited(&lease, retry_after);
                    let attempt = attempt
                        .finish(AttemptStatus::RateLimited)
                        .with_error(message);
                    writer.record(attempt).await?;

                    warn!(
                        provider,
                        backoff_ms = backoff.as_millis() as u64,
                        fallback = binding.fallback_on_failure(),
                        "Provider rate limited"
                    );
                    return Ok(on_failure);
                }
                Err(ProviderError::Fatal { message }) => {
                    let attempt = attempt
                        .finish(AttemptStatus::FatalFailure)
                        .with_error(message);
                    writer.record(attempt).await?;
                    return Ok(BindingVerdict::NextBinding);
                }
                Err(ProviderError::Retryable { message }) => {
                    let attempt = attempt
                        .finish(AttemptStatus::RetryableFailure)
                        .with_error(message);
                    writer.record(attempt).await?;

                    if retries >= binding.max_retries() {
                        return Ok(BindingVerdict::NextBinding);
                    }

                    let delay = retry.delay_for_retry(retries);
                    retries += 1;
                    debug!(
                        provider,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying binding after backoff"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Ok(BindingVerdict::Cancelled),
                    }
                }
            }
        }
    }

    /// Interactive-tier polling of a job the provider accepted
    async fn await_accepted_job(
        &self,
        request: &CollectionRequest,
        adapter: &dyn ProviderAdapter,
        handle: JobHandle,
        lease: &CredentialLease,
        writer: &mut AttemptWriter<'_>,
    ) -> Result<BindingVerdict, ChainError> {
        let accepted_at = Utc::now();
        let provider = adapter.name();
        let run = self
            .poller
            .poll(adapter, &handle, lease.credential(), PollTier::Interactive)
            .await;

        match run.outcome {
            PollOutcome::Succeeded(answer) => {
                let attempt = writer
                    .begin(provider, Some(lease.credential().id()))
                    .finish(AttemptStatus::Success)
                    .with_payload(answer_payload(&answer));
                writer.record(attempt).await?;

                let result = CollectorResult::from_answer(request, provider, answer);
                Ok(BindingVerdict::Finished(ChainOutcome::Completed(result)))
            }
            PollOutcome::Failed(reason) => {
                let attempt = writer
                    .begin(provider, Some(lease.credential().id()))
                    .finish(AttemptStatus::FatalFailure)
                    .with_error(reason);
                writer.record(attempt).await?;
                Ok(BindingVerdict::NextBinding)
            }
            PollOutcome::HandedOff | PollOutcome::TimedOut => {
                let job = PendingJob::new(
                    handle,
                    provider,
                    lease.credential().id(),
                    request.clone(),
                    accepted_at,
                    writer.next_sequence,
                );
                let job = self.pending_jobs.save(job).await?;

                info!(
                    job_handle = %job.job_handle(),
                    polls = run.polls,
                    "Interactive poll budget spent, job handed off"
                );
                Ok(BindingVerdict::Finished(ChainOutcome::HandedOff(job)))
            }
        }
    }

    /// Re-polls a handed-off job without re-submitting its request.
    ///
    /// Polls for at most one resume slice. The background deadline counts
    /// from when the provider accepted the job, so a job that is already
    /// too old gets one last poll before it times out.
    ///
    /// Resumes of the same handle run one at a time; a caller that waited
    /// behind a settling resume gets `AlreadySettled`.
    #[instrument(skip(self), fields(job_handle = %handle))]
    pub async fn resume(&self, handle: &JobHandle) -> Result<ResumeOutcome, DomainError> {
        let lock = self.resume_locks.for_handle(handle);
        let _held = lock.lock().await;

        let mut job = self
            .pending_jobs
            .get(handle)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Job '{}' not found", handle)))?;

        if job.status().is_terminal() {
            return Ok(ResumeOutcome::AlreadySettled(job));
        }

        let adapter = self.providers.get(job.provider()).ok_or_else(|| {
            DomainError::configuration(format!(
                "no adapter registered for provider '{}'",
                job.provider()
            ))
        })?;

        let slot = SlotKey::new(OperationKind::Collection, job.provider(), job.credential_id());
        let lease = match self.key_pool.lease_slot(&slot) {
            Some(lease) => lease,
            None => self
                .key_pool
                .acquire(OperationKind::Collection, job.provider())
                .map_err(|e| DomainError::credential(e.to_string()))?,
        };

        let config = self.poller.config();
        let remaining = config
            .deadline(PollTier::Background)
            .saturating_sub(job.age(Utc::now()));
        let slice = remaining.min(config.resume_slice());

        let run = self
            .poller
            .poll_within(
                adapter.as_ref(),
                handle,
                lease.credential(),
                PollTier::Background,
                slice,
            )
            .await;

        if let Some(settled) = self.settled_elsewhere(handle).await? {
            debug!(status = ?settled.status(), "Job settled by another resume");
            return Ok(ResumeOutcome::AlreadySettled(settled));
        }

        let sequence = job.next_attempt_sequence();
        let attempt = ProviderAttempt::start(
            job.request().correlation_id().clone(),
            sequence,
            job.provider(),
        )
        .with_credential_id(lease.credential().id());

        match run.outcome {
            PollOutcome::Succeeded(answer) => {
                self.attempts
                    .append(
                        attempt
                            .finish(AttemptStatus::Success)
                            .with_payload(answer_payload(&answer)),
                    )
                    .await?;

                let result = CollectorResult::from_answer(job.request(), job.provider(), answer);
                job.settle(PendingJobStatus::Succeeded, None);
                let job = self.pending_jobs.save(job).await?;

                info!(polls = run.polls, "Handed-off job completed");
                Ok(ResumeOutcome::Completed { result, job })
            }
            PollOutcome::Failed(reason) => {
                self.attempts
                    .append(
                        attempt
                            .finish(AttemptStatus::FatalFailure)
                            .with_error(reason.clone()),
                    )
                    .await?;

                job.settle(PendingJobStatus::Failed, Some(reason));
                let job = self.pending_jobs.save(job).await?;

                warn!(polls = run.polls, "Handed-off job failed");
                Ok(ResumeOutcome::Failed(job))
            }
            PollOutcome::HandedOff | PollOutcome::TimedOut if slice < remaining => {
                job.mark_polled();
                let job = self.pending_jobs.save(job).await?;

                debug!(polls = run.polls, "Handed-off job still running");
                Ok(ResumeOutcome::StillPending(job))
            }
            PollOutcome::HandedOff | PollOutcome::TimedOut => {
                let reason = "background poll deadline exceeded".to_string();
                self.attempts
                    .append(
                        attempt
                            .finish(AttemptStatus::FatalFailure)
                            .with_error(reason.clone()),
                    )
                    .await?;

                job.settle(PendingJobStatus::TimedOut, Some(reason));
                let job = self.pending_jobs.save(job).await?;

                warn!(polls = run.polls, "Handed-off job timed out");
                Ok(ResumeOutcome::TimedOut(job))
            }
        }
    }

    /// The stored job, when it left the handed-off state while we polled
    async fn settled_elsewhere(&self, handle: &JobHandle) -> Result<Option<PendingJob>, DomainError> {
        Ok(self
            .pending_jobs
            .get(handle)
            .await?
            .filter(|stored| stored.status().is_terminal()))
    }
}

fn answer_payload(answer: &ProviderAnswer) -> serde_json::Value {
    serde_json::to_value(answer).unwrap_or_else(|e| {
        warn!(error = %e, "Answer payload could not be serialized for the attempt log");
        serde_json::Value::Null
    })
}
