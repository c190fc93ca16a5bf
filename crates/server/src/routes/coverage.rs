use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use db::models::platform_status::PlatformCoverage;
use deployment::Deployment;
use services::services::platform_status::PlatformStatusService;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

pub async fn get_coverage(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<PlatformCoverage>>>, ApiError> {
    let coverage = PlatformStatusService::coverage(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(coverage)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/coverage", get(get_coverage))
}
