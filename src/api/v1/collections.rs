//! Collection batch endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{
    ApiError, BatchAccepted, BatchProgressResponse, Json, SubmitCollectionRequest, ValidJson,
};
use crate::domain::collection::BatchId;

/// POST /v1/collections - Register a batch and run it in the background
pub async fn submit_collection(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<SubmitCollectionRequest>,
) -> Result<(StatusCode, Json<BatchAccepted>), ApiError> {
    let spec = request.into_spec()?;
    let batch = state.collection_service.submit(spec).await?;

    info!(
        batch_id = %batch.batch_id(),
        requests = batch.totals().total,
        "Collection accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(BatchAccepted::from(&batch))))
}

/// GET /v1/collections/:batch_id - Batch progress
pub async fn get_collection(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchProgressResponse>, ApiError> {
    let batch_id = BatchId::new(batch_id)?;
    let batch = state.collection_service.progress(&batch_id).await?;

    Ok(Json(BatchProgressResponse::from(&batch)))
}

/// DELETE /v1/collections/:batch_id - Cancel a batch
pub async fn cancel_collection(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchProgressResponse>, ApiError> {
    let batch_id = BatchId::new(batch_id)?;
    let batch = state.collection_service.cancel(&batch_id).await?;

    Ok(Json(BatchProgressResponse::from(&batch)))
}
