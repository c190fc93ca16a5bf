use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::event_change_log::{EventChangeLog, EventChangeLogWithEvent};
use deployment::Deployment;
use serde::Deserialize;
use services::services::event_catalog::EventCatalogService;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Path, Query},
};

const DEFAULT_EVENT_CHANGES: i64 = 100;
const DEFAULT_RECENT_CHANGES: i64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct ChangeQuery {
    pub limit: Option<i64>,
}

pub async fn list_event_changes(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<ChangeQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<EventChangeLog>>>, ApiError> {
    let changes = EventCatalogService::list_changes(
        &deployment.db().pool,
        event_id,
        query.limit.unwrap_or(DEFAULT_EVENT_CHANGES),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(changes)))
}

/// Latest changes across the whole catalog, for the dashboard feed
pub async fn list_recent_changes(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<ChangeQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<EventChangeLogWithEvent>>>, ApiError> {
    let changes = EventCatalogService::recent_changes(
        &deployment.db().pool,
        query.limit.unwrap_or(DEFAULT_RECENT_CHANGES),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(changes)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/events/{event_id}/changes", get(list_event_changes))
        .route("/changes/recent", get(list_recent_changes))
}
