use axum::extract::{Path, State};
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::provider::JobHandle;
use crate::infrastructure::services::ResumeReport;

/// POST /v1/jobs/:job_handle/resume - Poll a handed-off job once more
pub async fn resume_job(
    State(state): State<AppState>,
    Path(job_handle): Path<String>,
) -> Result<Json<ResumeReport>, ApiError> {
    if job_handle.trim().is_empty() {
        return Err(ApiError::bad_request("Job handle is required").with_param("job_handle"));
    }

    let handle = JobHandle::new(job_handle);
    let report = state.collection_service.resume_polling(&handle).await?;

    info!(job_handle = %handle.as_str(), outcome = report.outcome, "Job resumed");
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use chrono::Utc;

    use super::*;
    use crate::domain::collection::fixtures;
    use crate::domain::polling::{MockPendingJobRepository, PendingJob};
    use crate::domain::DomainError;
    use crate::infrastructure::services::MockCollectionServiceTrait;

    fn state(service: MockCollectionServiceTrait) -> AppState {
        AppState::new(
            Arc::new(service),
            Arc::new(MockPendingJobRepository::new()),
            vec![],
        )
    }

    #[tokio::test]
    async fn test_resume_reports_outcome() {
        let mut service = MockCollectionServiceTrait::new();
        service
            .expect_resume_polling()
            .withf(|handle| handle.as_str() == "job-42")
            .returning(|handle| {
                Ok(ResumeReport {
                    outcome: "still_pending",
                    job: PendingJob::new(
                        handle.clone(),
                        "jobs-api",
                        "k1",
                        fixtures::request("search", 0),
                        Utc::now(),
                        1,
                    ),
                    collection: None,
                })
            });

        let Json(report) = resume_job(State(state(service)), Path("job-42".to_string()))
            .await
            .unwrap();

        assert_eq!(report.outcome, "still_pending");
        assert_eq!(report.job.job_handle().as_str(), "job-42");
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let mut service = MockCollectionServiceTrait::new();
        service
            .expect_resume_polling()
            .returning(|_| Err(DomainError::not_found("Job 'job-9' not found")));

        let err = resume_job(State(state(service)), Path("job-9".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blank_handle_rejected() {
        let err = resume_job(
            State(state(MockCollectionServiceTrait::new())),
            Path(" ".to_string()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
