use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use starwatch_core::{Category, CategoryCount, ObservationRecord, TrackedEntity};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct EntityHistory {
    entity: TrackedEntity,
    history: Vec<ObservationRecord>,
}

pub(super) async fn list_top(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<TrackedEntity>>>, ApiError> {
    let data = starwatch_db::list_top_by_popularity(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_rising(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<TrackedEntity>>>, ApiError> {
    let data = starwatch_db::list_top_by_growth(
        &state.pool,
        Some(Category::Rising),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<CategoryCount>>>, ApiError> {
    let data = starwatch_db::list_category_counts(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// `identity` is matched canonically; a `/` inside it must be sent as `%2F`.
pub(super) async fn get_history(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(identity): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<EntityHistory>>, ApiError> {
    let identity = identity.trim().to_lowercase();

    let entity = starwatch_db::get_entity(&state.pool, &identity)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("entity {identity} is not tracked"),
            )
        })?;
    let history = starwatch_db::list_history(&state.pool, &identity, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: EntityHistory { entity, history },
        meta: ResponseMeta::new(req_id.0),
    }))
}
