use async_trait::async_trait;
use db::DBService;
use services::services::{
    alert_detection::AlertThresholds,
    analytics_integration::{AnalyticsIntegration, AnalyticsSettingsError},
    config::{Config, ConfigError},
    http_log::HttpLogStore,
    notification::NotificationService,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    AnalyticsSettings(#[from] AnalyticsSettingsError),
    #[error("database schema check failed: {0}")]
    Schema(String),
}

/// Everything a request handler or background job needs from the running app
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new(config: Config) -> Result<Self, DeploymentError>;

    fn config(&self) -> &Config;

    fn db(&self) -> &DBService;

    fn notification_service(&self) -> &NotificationService;

    fn analytics(&self) -> &AnalyticsIntegration;

    fn http_log(&self) -> &HttpLogStore {
        self.analytics().http_log()
    }

    fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            drop_threshold_percent: self.config().alert_drop_threshold_percent,
            min_baseline: self.config().alert_min_baseline,
        }
    }

    /// Start alert detection and volume sync loops
    async fn spawn_background_services(&self);
}
