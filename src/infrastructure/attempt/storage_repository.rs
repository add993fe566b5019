//! Storage-backed attempt log

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::attempt::{AttemptLog, AttemptTrail, ProviderAttempt};
use crate::domain::collection::CorrelationId;
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::observability::record_provider_attempt;

/// One trail document per request; appends are serialized so concurrent
/// writers (a resume racing the sweeper) never drop an attempt.
#[derive(Debug)]
pub struct StorageAttemptLog {
    storage: Arc<dyn Storage<AttemptTrail>>,
    write_lock: Mutex<()>,
}

impl StorageAttemptLog {
    pub fn new(storage: Arc<dyn Storage<AttemptTrail>>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AttemptLog for StorageAttemptLog {
    async fn append(&self, attempt: ProviderAttempt) -> Result<(), DomainError> {
        record_provider_attempt(attempt.provider(), attempt.status().as_str(), attempt.duration());

        let _guard = self.write_lock.lock().await;
        let mut trail = self
            .storage
            .get(attempt.request_id())
            .await?
            .unwrap_or_else(|| AttemptTrail::new(attempt.request_id().clone()));
        trail.push(attempt);
        self.storage.upsert(trail).await?;
        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &CorrelationId,
    ) -> Result<Vec<ProviderAttempt>, DomainError> {
        Ok(self
            .storage
            .get(request_id)
            .await?
            .map(AttemptTrail::into_attempts)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attempt::AttemptStatus;
    use crate::domain::collection::fixtures;
    use crate::infrastructure::storage::InMemoryStorage;

    #[tokio::test]
    async fn test_appends_keep_sequence_order() {
        let log = StorageAttemptLog::new(Arc::new(InMemoryStorage::new()));
        let id = fixtures::request("chat", 0).correlation_id().clone();

        log.append(
            ProviderAttempt::start(id.clone(), 1, "provider-y").finish(AttemptStatus::Success),
        )
        .await
        .unwrap();
        log.append(
            ProviderAttempt::start(id.clone(), 0, "provider-x").finish(AttemptStatus::RateLimited),
        )
        .await
        .unwrap();

        let attempts = log.list_for_request(&id).await.unwrap();
        let seen: Vec<(u32, &str)> = attempts
            .iter()
            .map(|a| (a.sequence(), a.provider()))
            .collect();
        assert_eq!(seen, vec![(0, "provider-x"), (1, "provider-y")]);
    }

    #[tokio::test]
    async fn test_unknown_request_has_empty_trail() {
        let log = StorageAttemptLog::new(Arc::new(InMemoryStorage::new()));
        let id = fixtures::request("chat", 3).correlation_id().clone();

        assert!(log.list_for_request(&id).await.unwrap().is_empty());
    }
}
