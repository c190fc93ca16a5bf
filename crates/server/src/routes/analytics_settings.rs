use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::Utc;
use db::models::analytics_settings::{AnalyticsSettings, UpdateAnalyticsSettings};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::{
    analytics_integration::{AnalyticsIntegration, AnalyticsSettingsError},
    event_volume::{VolumeService, VolumeSyncReport},
};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::Json,
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ConnectionTestResult {
    pub connected: bool,
    pub error: Option<String>,
}

/// Stored settings with the API token masked
pub async fn get_settings(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<AnalyticsSettings>>, ApiError> {
    let settings = AnalyticsIntegration::get_settings(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(settings)))
}

pub async fn update_settings(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateAnalyticsSettings>,
) -> Result<ResponseJson<ApiResponse<AnalyticsSettings>>, ApiError> {
    let settings = deployment
        .analytics()
        .update_settings(&deployment.db().pool, payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(settings)))
}

/// Upstream failures are reported in the body rather than as an error status
pub async fn test_connection(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<ConnectionTestResult>>, ApiError> {
    let result = match deployment
        .analytics()
        .test_connection(&deployment.db().pool)
        .await
    {
        Ok(()) => ConnectionTestResult {
            connected: true,
            error: None,
        },
        Err(AnalyticsSettingsError::Api(e)) => ConnectionTestResult {
            connected: false,
            error: Some(e.to_string()),
        },
        Err(e) => return Err(e.into()),
    };
    Ok(ResponseJson(ApiResponse::success(result)))
}

pub async fn sync_volumes(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<VolumeSyncReport>>, ApiError> {
    let client = deployment.analytics().client().await?;
    let report = VolumeService::sync_from_analytics(
        &deployment.db().pool,
        &client,
        deployment.config().volume_sync_lookback_days.max(1) as u64,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/settings/analytics",
        Router::new()
            .route("/", get(get_settings).put(update_settings))
            .route("/test", post(test_connection))
            .route("/sync", post(sync_volumes)),
    )
}
