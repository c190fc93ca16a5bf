use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::event_category::{
    CreateEventCategory, EventCategory, EventCategoryWithCount, UpdateEventCategory,
};
use deployment::Deployment;
use services::services::category::CategoryService;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path},
};

pub async fn list_categories(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<EventCategoryWithCount>>>, ApiError> {
    let categories = CategoryService::list(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(categories)))
}

pub async fn create_category(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateEventCategory>,
) -> Result<ResponseJson<ApiResponse<EventCategory>>, ApiError> {
    let category = CategoryService::create(&deployment.db().pool, payload).await?;
    Ok(ResponseJson(ApiResponse::success(category)))
}

pub async fn get_category(
    State(deployment): State<DeploymentImpl>,
    Path(category_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<EventCategory>>, ApiError> {
    let category = CategoryService::get(&deployment.db().pool, category_id).await?;
    Ok(ResponseJson(ApiResponse::success(category)))
}

pub async fn update_category(
    State(deployment): State<DeploymentImpl>,
    Path(category_id): Path<Uuid>,
    Json(payload): Json<UpdateEventCategory>,
) -> Result<ResponseJson<ApiResponse<EventCategory>>, ApiError> {
    let category = CategoryService::update(&deployment.db().pool, category_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(category)))
}

/// Events in the category are kept and become uncategorised
pub async fn delete_category(
    State(deployment): State<DeploymentImpl>,
    Path(category_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    CategoryService::delete(&deployment.db().pool, category_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/categories",
        Router::new()
            .route("/", get(list_categories).post(create_category))
            .route(
                "/{category_id}",
                get(get_category).put(update_category).delete(delete_category),
            ),
    )
}
