use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::SearchRequest;
use crate::models::search_record::{JobStatus, SearchRecord};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// POST /api/v1/searches
pub async fn handle_submit(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    req.validate().map_err(AppError::Validation)?;
    let record = state.runner.submit(req).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            id: record.id,
            status: record.status,
        }),
    ))
}

/// GET /api/v1/searches/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SearchRecord>, AppError> {
    let record = state
        .repository
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Search {id} not found")))?;
    Ok(Json(record))
}

/// GET /api/v1/searches
pub async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<SearchRecord>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(Json(state.repository.list(limit).await?))
}
