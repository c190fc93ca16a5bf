use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    alert_detection::AlertDetectionService,
    analytics_integration::AnalyticsIntegration,
    config::Config,
    database_validator::DatabaseValidator,
    event_volume::VolumeSyncService,
    http_log::HttpLogStore,
    notification::NotificationService,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<Config>,
    db: DBService,
    notification_service: NotificationService,
    analytics: AnalyticsIntegration,
    background_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new(config: Config) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;

        let validation = DatabaseValidator::new(db.pool.clone())
            .validate()
            .await
            .map_err(|e| DeploymentError::Schema(e.to_string()))?;
        if !validation.is_ok() {
            return Err(DeploymentError::Schema(validation.summary()));
        }

        let http_log = HttpLogStore::new(config.http_log_capacity);
        let analytics = AnalyticsIntegration::new(http_log);
        analytics.load(&db.pool).await?;

        let notification_service = NotificationService::new(config.alert_webhook_url.clone());
        if config.alert_webhook_url.is_none() {
            info!("ALERT_WEBHOOK_URL not set - alerts will only be logged");
        }

        Ok(Self {
            config: Arc::new(config),
            db,
            notification_service,
            analytics,
            background_tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn notification_service(&self) -> &NotificationService {
        &self.notification_service
    }

    fn analytics(&self) -> &AnalyticsIntegration {
        &self.analytics
    }

    async fn spawn_background_services(&self) {
        let alert_handle = AlertDetectionService::spawn(
            self.db.clone(),
            self.notification_service.clone(),
            self.alert_thresholds(),
            self.config.alert_poll_interval,
        )
        .await;
        let sync_handle = VolumeSyncService::spawn(
            self.db.clone(),
            self.analytics.clone(),
            self.config.volume_sync_interval,
            self.config.volume_sync_lookback_days as u64,
        )
        .await;

        match self.background_tasks.lock() {
            Ok(mut tasks) => tasks.extend([alert_handle, sync_handle]),
            Err(_) => warn!("Background task registry poisoned; tasks keep running untracked"),
        }
    }
}

impl LocalDeployment {
    /// Abort background loops, used on shutdown
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.background_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}
