use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use chrono::NaiveDate;
use db::models::event_volume::{EventVolume, IngestEventVolumes};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::event_volume::VolumeService;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
};

#[derive(Debug, Default, Deserialize)]
pub struct VolumeRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct IngestResult {
    pub days_written: u64,
}

/// Daily counts in `[from, to]`, the last 30 days when omitted
pub async fn get_volume_history(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
    Query(range): Query<VolumeRangeQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<EventVolume>>>, ApiError> {
    let volumes =
        VolumeService::history(&deployment.db().pool, event_id, range.from, range.to).await?;
    Ok(ResponseJson(ApiResponse::success(volumes)))
}

pub async fn ingest_volumes(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<IngestEventVolumes>,
) -> Result<ResponseJson<ApiResponse<IngestResult>>, ApiError> {
    let days_written =
        VolumeService::ingest(&deployment.db().pool, event_id, &payload.counts).await?;
    Ok(ResponseJson(ApiResponse::success(IngestResult { days_written })))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route(
        "/events/{event_id}/volumes",
        get(get_volume_history).post(ingest_volumes),
    )
}
