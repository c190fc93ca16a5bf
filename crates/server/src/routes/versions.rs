use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::event_version::{CreateEventVersion, EventVersion, EventVersionDiff};
use deployment::Deployment;
use serde::Deserialize;
use services::services::event_catalog::EventCatalogService;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
};

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub from: i64,
    pub to: i64,
}

pub async fn list_versions(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<EventVersion>>>, ApiError> {
    let versions = EventCatalogService::list_versions(&deployment.db().pool, event_id).await?;
    Ok(ResponseJson(ApiResponse::success(versions)))
}

/// Publish the next schema version of an event
pub async fn create_version(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<CreateEventVersion>,
) -> Result<ResponseJson<ApiResponse<EventVersion>>, ApiError> {
    let version =
        EventCatalogService::create_version(&deployment.db().pool, event_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(version)))
}

pub async fn get_version(
    State(deployment): State<DeploymentImpl>,
    Path((event_id, version)): Path<(Uuid, i64)>,
) -> Result<ResponseJson<ApiResponse<EventVersion>>, ApiError> {
    let version = EventCatalogService::get_version(&deployment.db().pool, event_id, version).await?;
    Ok(ResponseJson(ApiResponse::success(version)))
}

pub async fn diff_versions(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<DiffQuery>,
) -> Result<ResponseJson<ApiResponse<EventVersionDiff>>, ApiError> {
    let diff =
        EventCatalogService::diff_versions(&deployment.db().pool, event_id, query.from, query.to)
            .await?;
    Ok(ResponseJson(ApiResponse::success(diff)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/events/{event_id}/versions",
        Router::new()
            .route("/", get(list_versions).post(create_version))
            .route("/diff", get(diff_versions))
            .route("/{version}", get(get_version)),
    )
}
