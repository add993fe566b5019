use axum::extract::{Path, State};

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::collection::CorrelationId;
use crate::infrastructure::services::ResultView;

/// GET /v1/results/:correlation_id - A collected answer and its enrichment
pub async fn get_result(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Json<ResultView>, ApiError> {
    let id = CorrelationId::parse(correlation_id)?;
    let view = state.collection_service.result(&id).await?;

    Ok(Json(view))
}
