//! Bounded polling of accepted jobs

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, instrument, warn};

use super::config::{PollTier, PollingConfig};
use super::state::PollState;
use crate::domain::key_pool::Credential;
use crate::domain::provider::{JobHandle, JobStatus, ProviderAdapter, ProviderAnswer, ProviderError};

/// How a poll run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded(ProviderAnswer),
    Failed(String),
    /// Interactive budget ran out; the job still belongs to the provider
    HandedOff,
    /// Background budget ran out
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollRun {
    pub outcome: PollOutcome,
    pub polls: u32,
    pub final_state: PollState,
}

/// Polls job handles on a growing interval until a tier deadline.
///
/// Sessions sleep on a timer and also listen on a wake channel, so
/// [`AsyncPoller::nudge`] makes every waiting session poll right away.
#[derive(Debug)]
pub struct AsyncPoller {
    config: PollingConfig,
    wake: watch::Sender<u64>,
}

impl AsyncPoller {
    pub fn new(config: PollingConfig) -> Self {
        let (wake, _) = watch::channel(0);
        Self { config, wake }
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Wakes every waiting session for an immediate poll
    pub fn nudge(&self) {
        self.wake.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Polls with the full budget of `tier`
    pub async fn poll(
        &self,
        adapter: &dyn ProviderAdapter,
        handle: &JobHandle,
        credential: &Credential,
        tier: PollTier,
    ) -> PollRun {
        self.poll_within(adapter, handle, credential, tier, self.config.deadline(tier))
            .await
    }

    /// Polls until the job settles or `budget` runs out.
    ///
    /// Background sessions poll once immediately; interactive sessions start
    /// with a full interval since the job was accepted a moment ago.
    #[instrument(skip(self, adapter, credential), fields(provider = adapter.name()))]
    pub async fn poll_within(
        &self,
        adapter: &dyn ProviderAdapter,
        handle: &JobHandle,
        credential: &Credential,
        tier: PollTier,
        budget: Duration,
    ) -> PollRun {
        let deadline = Instant::now() + budget;
        let mut wake = self.wake.subscribe();
        let mut state = PollState::Accepted;
        let mut interval = self.config.initial_interval();
        let mut polls = 0u32;
        let mut wait_first = tier == PollTier::Interactive;

        loop {
            if wait_first {
                let next_wake = Instant::now() + interval;
                if next_wake > deadline {
                    state = advance(state, PollState::TimedOut);
                    debug!(polls, %tier, "Poll budget exhausted");

                    let outcome = match tier {
                        PollTier::Interactive => PollOutcome::HandedOff,
                        PollTier::Background => PollOutcome::TimedOut,
                    };
                    return PollRun {
                        outcome,
                        polls,
                        final_state: state,
                    };
                }

                tokio::select! {
                    _ = tokio::time::sleep_until(next_wake) => {}
                    Ok(()) = wake.changed() => {
                        debug!("Poll session nudged");
                    }
                }

                interval = self.config.next_interval(interval);
            }
            wait_first = true;

            state = advance(state, PollState::Polling);
            polls += 1;

            let settled = match timeout(self.config.poll_timeout(), adapter.poll(handle, credential))
                .await
            {
                Err(_) => {
                    warn!(polls, "Poll request timed out");
                    None
                }
                Ok(Ok(JobStatus::Running)) => None,
                Ok(Ok(JobStatus::Completed(answer))) => {
                    Some((PollState::Succeeded, PollOutcome::Succeeded(answer)))
                }
                Ok(Ok(JobStatus::Failed(reason))) => {
                    Some((PollState::Failed, PollOutcome::Failed(reason)))
                }
                Ok(Err(ProviderError::Fatal { message })) => {
                    Some((PollState::Failed, PollOutcome::Failed(message)))
                }
                Ok(Err(error)) => {
                    warn!(polls, error = %error, "Transient poll failure");
                    None
                }
            };

            if let Some((next_state, outcome)) = settled {
                return PollRun {
                    outcome,
                    polls,
                    final_state: advance(state, next_state),
                };
            }
        }
    }
}

fn advance(current: PollState, next: PollState) -> PollState {
    debug_assert!(
        current.can_transition_to(next),
        "invalid poll transition {:?} -> {:?}",
        current,
        next
    );
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::mock::MockProviderAdapter;
    use std::sync::Arc;

    fn config() -> PollingConfig {
        PollingConfig {
            initial_interval_ms: 100,
            multiplier: 2.0,
            max_interval_ms: 400,
            interactive_deadline_ms: 1_000,
            background_deadline_ms: 10_000,
            poll_timeout_ms: 50,
            resume_slice_ms: 2_000,
        }
    }

    fn credential() -> Credential {
        Credential::new("k1", "secret")
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_succeeds_after_running() {
        let adapter = MockProviderAdapter::new("jobs")
            .with_poll(Ok(JobStatus::Running))
            .with_poll(Ok(JobStatus::Running))
            .with_poll(Ok(JobStatus::Completed(ProviderAnswer::new("done"))));
        let poller = AsyncPoller::new(config());

        let run = poller
            .poll(&adapter, &JobHandle::new("job-1"), &credential(), PollTier::Interactive)
            .await;

        assert_eq!(run.outcome, PollOutcome::Succeeded(ProviderAnswer::new("done")));
        assert_eq!(run.polls, 3);
        assert_eq!(run.final_state, PollState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interactive_timeout_hands_off_within_deadline() {
        let adapter = MockProviderAdapter::new("jobs").with_poll(Ok(JobStatus::Running));
        let poller = AsyncPoller::new(config());
        let started = Instant::now();

        let run = poller
            .poll(&adapter, &JobHandle::new("job-1"), &credential(), PollTier::Interactive)
            .await;

        assert_eq!(run.outcome, PollOutcome::HandedOff);
        assert_eq!(run.final_state, PollState::TimedOut);
        assert!(started.elapsed() <= Duration::from_millis(1_000));
        // waits of 100, 200, 400 fit; the next 400 would pass the deadline
        assert_eq!(run.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_timeout_is_terminal() {
        let adapter = MockProviderAdapter::new("jobs").with_poll(Ok(JobStatus::Running));
        let poller = AsyncPoller::new(config());

        let run = poller
            .poll_within(
                &adapter,
                &JobHandle::new("job-1"),
                &credential(),
                PollTier::Background,
                Duration::from_millis(250),
            )
            .await;

        assert_eq!(run.outcome, PollOutcome::TimedOut);
        // immediate poll, then after 100ms; the next 200ms wait would overrun
        assert_eq!(run.polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_failure_and_fatal_error_fail_the_run() {
        let poller = AsyncPoller::new(config());

        let failed = MockProviderAdapter::new("jobs")
            .with_poll(Ok(JobStatus::Failed("model refused".to_string())));
        let run = poller
            .poll(&failed, &JobHandle::new("job-1"), &credential(), PollTier::Background)
            .await;
        assert_eq!(run.outcome, PollOutcome::Failed("model refused".to_string()));

        let fatal = MockProviderAdapter::new("jobs")
            .with_poll(Err(ProviderError::fatal("unknown job")));
        let run = poller
            .poll(&fatal, &JobHandle::new("job-2"), &credential(), PollTier::Background)
            .await;
        assert_eq!(run.outcome, PollOutcome::Failed("unknown job".to_string()));
        assert_eq!(run.final_state, PollState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_keep_polling() {
        let adapter = MockProviderAdapter::new("jobs")
            .with_poll(Err(ProviderError::retryable("502")))
            .with_poll(Err(ProviderError::rate_limited("429", None)))
            .with_poll(Ok(JobStatus::Completed(ProviderAnswer::new("ok"))));
        let poller = AsyncPoller::new(config());

        let run = poller
            .poll(&adapter, &JobHandle::new("job-1"), &credential(), PollTier::Interactive)
            .await;

        assert!(matches!(run.outcome, PollOutcome::Succeeded(_)));
        assert_eq!(adapter.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_poll_request_counts_as_transient() {
        let adapter = MockProviderAdapter::new("jobs")
            .with_poll(Ok(JobStatus::Completed(ProviderAnswer::new("too late"))))
            .with_delay(Duration::from_millis(100));
        let poller = AsyncPoller::new(config());

        let run = poller
            .poll(&adapter, &JobHandle::new("job-1"), &credential(), PollTier::Interactive)
            .await;

        assert_eq!(run.outcome, PollOutcome::HandedOff);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nudge_triggers_early_poll() {
        let adapter = Arc::new(
            MockProviderAdapter::new("jobs")
                .with_poll(Ok(JobStatus::Completed(ProviderAnswer::new("early")))),
        );
        let poller = Arc::new(AsyncPoller::new(PollingConfig {
            initial_interval_ms: 5_000,
            interactive_deadline_ms: 60_000,
            ..config()
        }));

        let session = {
            let adapter = Arc::clone(&adapter);
            let poller = Arc::clone(&poller);
            tokio::spawn(async move {
                poller
                    .poll(
                        adapter.as_ref(),
                        &JobHandle::new("job-1"),
                        &credential(),
                        PollTier::Interactive,
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = Instant::now();
        poller.nudge();

        let run = session.await.unwrap();
        assert!(matches!(run.outcome, PollOutcome::Succeeded(_)));
        assert!(started.elapsed() < Duration::from_millis(5_000));
    }
}
