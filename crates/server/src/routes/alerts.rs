use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::{Days, NaiveDate, Utc};
use db::models::alert::{EventAlert, EventAlertFilter, EventAlertWithEvent, UpsertEventAlertRule};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::alert_detection::{AlertService, EffectiveAlertRule};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
};

#[derive(Debug, Default, Deserialize)]
pub struct DetectionRunQuery {
    pub day: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct DetectionRunResult {
    pub day: NaiveDate,
    pub raised: Vec<EventAlert>,
    pub resolved: Vec<EventAlert>,
}

pub async fn get_alert_rule(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<EffectiveAlertRule>>, ApiError> {
    let rule = AlertService::effective_rule(
        &deployment.db().pool,
        event_id,
        deployment.alert_thresholds(),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(rule)))
}

pub async fn upsert_alert_rule(
    State(deployment): State<DeploymentImpl>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<UpsertEventAlertRule>,
) -> Result<ResponseJson<ApiResponse<EffectiveAlertRule>>, ApiError> {
    let rule = AlertService::upsert_rule(&deployment.db().pool, event_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(rule)))
}

pub async fn list_alerts(
    State(deployment): State<DeploymentImpl>,
    Query(filter): Query<EventAlertFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<EventAlertWithEvent>>>, ApiError> {
    let alerts = AlertService::list(&deployment.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(alerts)))
}

/// Run detection on demand; `day` defaults to yesterday
pub async fn run_detection(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<DetectionRunQuery>,
) -> Result<ResponseJson<ApiResponse<DetectionRunResult>>, ApiError> {
    let today = Utc::now().date_naive();
    let day = match query.day {
        Some(day) => day,
        None => today
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| ApiError::BadRequest("no day before today".to_string()))?,
    };

    let pool = &deployment.db().pool;
    let resolved = AlertService::resolve_recovered(pool, day).await?;
    let raised = AlertService::run_detection(
        pool,
        deployment.notification_service(),
        deployment.alert_thresholds(),
        day,
    )
    .await?;

    Ok(ResponseJson(ApiResponse::success(DetectionRunResult {
        day,
        raised,
        resolved,
    })))
}

pub async fn acknowledge_alert(
    State(deployment): State<DeploymentImpl>,
    Path(alert_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<EventAlert>>, ApiError> {
    let alert = AlertService::acknowledge(&deployment.db().pool, alert_id).await?;
    Ok(ResponseJson(ApiResponse::success(alert)))
}

pub async fn resolve_alert(
    State(deployment): State<DeploymentImpl>,
    Path(alert_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<EventAlert>>, ApiError> {
    let alert = AlertService::resolve(&deployment.db().pool, alert_id).await?;
    Ok(ResponseJson(ApiResponse::success(alert)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route(
            "/events/{event_id}/alert-rule",
            get(get_alert_rule).put(upsert_alert_rule),
        )
        .nest(
            "/alerts",
            Router::new()
                .route("/", get(list_alerts))
                .route("/run", post(run_detection))
                .route("/{alert_id}/acknowledge", post(acknowledge_alert))
                .route("/{alert_id}/resolve", post(resolve_alert)),
        )
}
