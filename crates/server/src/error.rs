use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::{
    alert_detection::AlertError,
    analytics_api::AnalyticsApiError,
    analytics_integration::AnalyticsSettingsError,
    event_catalog::CatalogError,
    event_volume::VolumeError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Alert(#[from] AlertError),
    #[error(transparent)]
    Volume(#[from] VolumeError),
    #[error(transparent)]
    AnalyticsSettings(#[from] AnalyticsSettingsError),
    #[error(transparent)]
    AnalyticsApi(#[from] AnalyticsApiError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Json(#[from] JsonRejection),
    #[error(transparent)]
    Path(#[from] PathRejection),
    #[error(transparent)]
    Query(#[from] QueryRejection),
}

fn upstream_status(err: &AnalyticsApiError) -> StatusCode {
    match err {
        AnalyticsApiError::NotConfigured(_) | AnalyticsApiError::Disabled => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Catalog(err) => match err {
                CatalogError::Validation(_) => (StatusCode::BAD_REQUEST, "CatalogError"),
                CatalogError::NotFound(_) => (StatusCode::NOT_FOUND, "CatalogError"),
                CatalogError::Conflict(_) => (StatusCode::CONFLICT, "CatalogError"),
                CatalogError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CatalogError"),
            },
            ApiError::Alert(err) => match err {
                AlertError::Validation(_) => (StatusCode::BAD_REQUEST, "AlertError"),
                AlertError::NotFound(_) => (StatusCode::NOT_FOUND, "AlertError"),
                AlertError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "AlertError"),
            },
            ApiError::Volume(err) => match err {
                VolumeError::Validation(_) => (StatusCode::BAD_REQUEST, "VolumeError"),
                VolumeError::NotFound(_) => (StatusCode::NOT_FOUND, "VolumeError"),
                VolumeError::Api(api) => (upstream_status(api), "VolumeError"),
                VolumeError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "VolumeError"),
            },
            ApiError::AnalyticsSettings(err) => match err {
                AnalyticsSettingsError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "AnalyticsSettingsError")
                }
                AnalyticsSettingsError::Api(api) => (upstream_status(api), "AnalyticsSettingsError"),
                AnalyticsSettingsError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "AnalyticsSettingsError")
                }
            },
            ApiError::AnalyticsApi(err) => (upstream_status(err), "AnalyticsApiError"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::Json(rejection) => (rejection.status(), "JsonRejection"),
            ApiError::Path(rejection) => (rejection.status(), "PathRejection"),
            ApiError::Query(rejection) => (rejection.status(), "QueryRejection"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = self.status_and_kind();

        // Internal details stay in the logs
        let error_message = if status_code.is_server_error() && status_code != StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self, kind = error_type, "Request failed");
            "An internal error occurred. Please try again.".to_string()
        } else {
            tracing::debug!(error = %self, kind = error_type, status = %status_code, "Request rejected");
            self.to_string()
        };

        let response = ApiResponse::<()>::error(&error_message);
        (status_code, ResponseJson(response)).into_response()
    }
}
