use axum::{
    extract::{Query, State},
    Extension, Json,
};
use starwatch_core::Alert;

use crate::middleware::RequestId;

use super::entities::LimitQuery;
use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

pub(super) async fn list_alerts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<Alert>>>, ApiError> {
    let data = starwatch_db::list_recent_alerts(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
