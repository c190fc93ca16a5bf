use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::tracking_event::{
    CreateTrackingEvent, Paginated, TrackingEvent, TrackingEventDetail, TrackingEventFilter,
    UpdateTrackingEvent,
};
use deployment::Deployment;
use services::services::event_catalog::EventCatalogService;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
};

/// Filtered, paginated event list
pub async fn list_events(
    State(deployment): State<DeploymentImpl>,
    Query(filter): Query<TrackingEventFilter>,
) -> Result<ResponseJson<ApiResponse<Paginated<TrackingEvent>>>, ApiError> {
    let events = EventCatalogService::list(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(events)))
}

pub async fn create_event(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateTrackingEvent>,
) -> Result<ResponseJson<ApiResponse<TrackingEventDetail>>, ApiError> {
    let event = EventCatalogService::create(&deployment.db().pool, payload).await?;
    Ok(ResponseJson(ApiResponse::success(event)))
}

pub async fn get_event(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<TrackingEventDetail>>, ApiError> {
    let event = EventCatalogService::get_detail(&deployment.db().pool, event_id).await?;
    Ok(ResponseJson(ApiResponse::success(event)))
}

pub async fn update_event(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<UpdateTrackingEvent>,
) -> Result<ResponseJson<ApiResponse<TrackingEvent>>, ApiError> {
    let event = EventCatalogService::update(&deployment.db().pool, event_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(event)))
}

pub async fn deprecate_event(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<TrackingEvent>>, ApiError> {
    let event = EventCatalogService::deprecate(&deployment.db().pool, event_id).await?;
    Ok(ResponseJson(ApiResponse::success(event)))
}

pub async fn delete_event(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    EventCatalogService::delete(&deployment.db().pool, event_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/events",
        Router::new()
            .route("/", get(list_events).post(create_event))
            .route(
                "/{event_id}",
                get(get_event).put(update_event).delete(delete_event),
            )
            .route("/{event_id}/deprecate", post(deprecate_event)),
    )
}
