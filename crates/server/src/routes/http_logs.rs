use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::http_log::{HttpLogEntry, HttpLogStats};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::Query,
};

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct HttpLogQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub errors_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ClearHttpLogsResult {
    pub cleared: usize,
}

/// Outbound analytics API calls, newest first
pub async fn list_http_logs(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<HttpLogQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<HttpLogEntry>>>, ApiError> {
    let entries = deployment
        .http_log()
        .list(query.limit.unwrap_or(DEFAULT_LOG_LIMIT), query.errors_only);
    Ok(ResponseJson(ApiResponse::success(entries)))
}

pub async fn clear_http_logs(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<ClearHttpLogsResult>>, ApiError> {
    let cleared = deployment.http_log().clear();
    Ok(ResponseJson(ApiResponse::success(ClearHttpLogsResult { cleared })))
}

pub async fn http_log_stats(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<HttpLogStats>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(deployment.http_log().stats())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/http-logs", get(list_http_logs).delete(clear_http_logs))
        .route("/http-logs/stats", get(http_log_stats))
}
