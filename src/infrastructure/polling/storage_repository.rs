//! Storage-backed pending job repository

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::polling::{PendingJob, PendingJobRepository, PendingJobStatus};
use crate::domain::provider::JobHandle;
use crate::domain::storage::Storage;
use crate::domain::DomainError;

#[derive(Debug)]
pub struct StoragePendingJobRepository {
    storage: Arc<dyn Storage<PendingJob>>,
}

impl StoragePendingJobRepository {
    pub fn new(storage: Arc<dyn Storage<PendingJob>>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PendingJobRepository for StoragePendingJobRepository {
    async fn save(&self, job: PendingJob) -> Result<PendingJob, DomainError> {
        self.storage.upsert(job).await
    }

    async fn get(&self, handle: &JobHandle) -> Result<Option<PendingJob>, DomainError> {
        self.storage.get(handle).await
    }

    /// Oldest first, so the sweeper works through the backlog in order
    async fn list_handed_off(&self) -> Result<Vec<PendingJob>, DomainError> {
        let mut jobs: Vec<PendingJob> = self
            .storage
            .list()
            .await?
            .into_iter()
            .filter(|job| job.status() == PendingJobStatus::HandedOff)
            .collect();
        jobs.sort_by_key(|job| job.accepted_at());
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::domain::collection::fixtures;
    use crate::infrastructure::storage::InMemoryStorage;

    fn job(handle: &str, age_secs: i64) -> PendingJob {
        PendingJob::new(
            JobHandle::new(handle),
            "jobs-api",
            "k1",
            fixtures::request("chat", 0),
            Utc::now() - Duration::seconds(age_secs),
            1,
        )
    }

    #[tokio::test]
    async fn test_list_handed_off_skips_settled_and_orders_by_age() {
        let repo = StoragePendingJobRepository::new(Arc::new(InMemoryStorage::new()));

        repo.save(job("job-new", 10)).await.unwrap();
        repo.save(job("job-old", 100)).await.unwrap();
        let mut settled = job("job-done", 50);
        settled.settle(PendingJobStatus::Succeeded, None);
        repo.save(settled).await.unwrap();

        let handles: Vec<String> = repo
            .list_handed_off()
            .await
            .unwrap()
            .iter()
            .map(|j| j.job_handle().to_string())
            .collect();
        assert_eq!(handles, vec!["job-old", "job-new"]);
    }

    #[tokio::test]
    async fn test_save_overwrites_same_handle() {
        let repo = StoragePendingJobRepository::new(Arc::new(InMemoryStorage::new()));

        let mut first = job("job-1", 5);
        repo.save(first.clone()).await.unwrap();
        first.mark_polled();
        repo.save(first).await.unwrap();

        let stored = repo.get(&JobHandle::new("job-1")).await.unwrap().unwrap();
        assert!(stored.last_polled_at().is_some());
    }
}
