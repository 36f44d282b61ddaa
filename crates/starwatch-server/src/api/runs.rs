use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::entities::LimitQuery;
use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct RunItem {
    run_id: Uuid,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    counts: RunCountsItem,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunCountsItem {
    received: i32,
    rejected: i32,
    created: i32,
    updated: i32,
    classification_errors: i32,
    alerts_emitted: i32,
    candidates_not_emitted: i32,
}

impl From<starwatch_db::WatchRunRow> for RunItem {
    fn from(row: starwatch_db::WatchRunRow) -> Self {
        Self {
            run_id: row.public_id,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            counts: RunCountsItem {
                received: row.received,
                rejected: row.rejected,
                created: row.created,
                updated: row.updated,
                classification_errors: row.classification_errors,
                alerts_emitted: row.alerts_emitted,
                candidates_not_emitted: row.candidates_not_emitted,
            },
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<RunItem>>>, ApiError> {
    let runs = starwatch_db::list_watch_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: runs.into_iter().map(RunItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
