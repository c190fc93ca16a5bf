use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::platform_status::{Platform, PlatformStatus, UpdatePlatformStatus};
use deployment::Deployment;
use services::services::platform_status::PlatformStatusService;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path},
};

pub async fn list_platform_statuses(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<PlatformStatus>>>, ApiError> {
    let statuses = PlatformStatusService::list(&deployment.db().pool, event_id).await?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

pub async fn update_platform_status(
    State(deployment): State<DeploymentImpl>,
    Path((event_id, platform)): Path<(Uuid, Platform)>,
    Json(payload): Json<UpdatePlatformStatus>,
) -> Result<ResponseJson<ApiResponse<PlatformStatus>>, ApiError> {
    let status =
        PlatformStatusService::update(&deployment.db().pool, event_id, platform, payload).await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/events/{event_id}/platforms", get(list_platform_statuses))
        .route(
            "/events/{event_id}/platforms/{platform}",
            put(update_platform_status),
        )
}
