//! v1 collection API endpoints

pub mod collections;
pub mod jobs;
pub mod results;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/collections", post(collections::submit_collection))
        .route(
            "/collections/{batch_id}",
            get(collections::get_collection).delete(collections::cancel_collection),
        )
        .route("/results/{correlation_id}", get(results::get_result))
        .route("/jobs/{job_handle}/resume", post(jobs::resume_job))
}
