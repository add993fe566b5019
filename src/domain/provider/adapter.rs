use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use super::outcome::{JobHandle, JobStatus, ProviderError, ProviderQuery, Submission};
use crate::domain::key_pool::Credential;

/// One upstream answer API
///
/// Adapters build the wire request, parse the response into a
/// [`super::ProviderAnswer`], and classify every failure as retryable, fatal
/// or rate limited. They never retry on their own.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn submit(
        &self,
        query: &ProviderQuery,
        credential: &Credential,
    ) -> Result<Submission, ProviderError>;

    /// Polls an accepted job. Synchronous providers never hand out handles.
    async fn poll(
        &self,
        handle: &JobHandle,
        _credential: &Credential,
    ) -> Result<JobStatus, ProviderError> {
        Err(ProviderError::fatal(format!(
            "provider '{}' does not support polling job '{}'",
            self.name(),
            handle
        )))
    }
}

/// Adapters by provider name
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted adapter: each call pops the next queued outcome, the last
    /// outcome repeats once the queue is down to one entry.
    #[derive(Debug)]
    pub struct MockProviderAdapter {
        name: String,
        submits: Mutex<VecDeque<Result<Submission, ProviderError>>>,
        polls: Mutex<VecDeque<Result<JobStatus, ProviderError>>>,
        delay: Option<Duration>,
        submit_calls: Mutex<Vec<String>>,
        poll_calls: Mutex<u32>,
    }

    impl MockProviderAdapter {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                submits: Mutex::new(VecDeque::new()),
                polls: Mutex::new(VecDeque::new()),
                delay: None,
                submit_calls: Mutex::new(Vec::new()),
                poll_calls: Mutex::new(0),
            }
        }

        pub fn answering(name: impl Into<String>, text: &str) -> Self {
            Self::new(name).with_submit(Ok(Submission::Completed(
                crate::domain::provider::ProviderAnswer::new(text),
            )))
        }

        pub fn failing(name: impl Into<String>, error: ProviderError) -> Self {
            Self::new(name).with_submit(Err(error))
        }

        pub fn with_submit(self, outcome: Result<Submission, ProviderError>) -> Self {
            self.submits.lock().unwrap().push_back(outcome);
            self
        }

        pub fn with_poll(self, outcome: Result<JobStatus, ProviderError>) -> Self {
            self.polls.lock().unwrap().push_back(outcome);
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn submit_count(&self) -> usize {
            self.submit_calls.lock().unwrap().len()
        }

        /// Credential ids used, in call order
        pub fn credentials_used(&self) -> Vec<String> {
            self.submit_calls.lock().unwrap().clone()
        }

        pub fn poll_count(&self) -> u32 {
            *self.poll_calls.lock().unwrap()
        }

        fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
            let mut queue = queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProviderAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn submit(
            &self,
            _query: &ProviderQuery,
            credential: &Credential,
        ) -> Result<Submission, ProviderError> {
            self.submit_calls
                .lock()
                .unwrap()
                .push(credential.id().to_string());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            Self::next(&self.submits)
                .unwrap_or_else(|| Err(ProviderError::fatal("no scripted submit outcome")))
        }

        async fn poll(
            &self,
            _handle: &JobHandle,
            _credential: &Credential,
        ) -> Result<JobStatus, ProviderError> {
            *self.poll_calls.lock().unwrap() += 1;

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            Self::next(&self.polls)
                .unwrap_or_else(|| Err(ProviderError::fatal("no scripted poll outcome")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockProviderAdapter;
    use super::*;

    #[tokio::test]
    async fn test_default_poll_is_fatal() {
        #[derive(Debug)]
        struct SyncOnly;

        #[async_trait]
        impl ProviderAdapter for SyncOnly {
            fn name(&self) -> &str {
                "sync-only"
            }

            async fn submit(
                &self,
                _query: &ProviderQuery,
                _credential: &Credential,
            ) -> Result<Submission, ProviderError> {
                Err(ProviderError::fatal("unused"))
            }
        }

        let result = SyncOnly
            .poll(&JobHandle::new("job-1"), &Credential::new("k1", "secret"))
            .await;

        assert!(matches!(result, Err(ProviderError::Fatal { .. })));
    }

    #[test]
    fn test_registry_lookup_by_name() {
        let registry = ProviderRegistry::new()
            .with_adapter(Arc::new(MockProviderAdapter::new("provider-b")))
            .with_adapter(Arc::new(MockProviderAdapter::new("provider-a")));

        assert!(registry.get("provider-a").is_some());
        assert!(registry.get("provider-z").is_none());
        assert_eq!(registry.names(), vec!["provider-a", "provider-b"]);
    }
}
