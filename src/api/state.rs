//! Application state for shared services

use std::sync::Arc;

use crate::domain::polling::PendingJobRepository;
use crate::infrastructure::services::CollectionServiceTrait;

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub collection_service: Arc<dyn CollectionServiceTrait>,
    /// Also used by `/ready` as a storage round trip
    pub pending_jobs: Arc<dyn PendingJobRepository>,
    /// Names of the configured answer providers
    pub providers: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        collection_service: Arc<dyn CollectionServiceTrait>,
        pending_jobs: Arc<dyn PendingJobRepository>,
        providers: Vec<String>,
    ) -> Self {
        Self {
            collection_service,
            pending_jobs,
            providers: Arc::new(providers),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("collection_service", &self.collection_service)
            .field("providers", &self.providers)
            .finish()
    }
}
