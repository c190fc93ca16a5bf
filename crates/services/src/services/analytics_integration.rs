//! Runtime-editable analytics API settings and the client built from them.

use std::sync::Arc;

use db::models::analytics_settings::{AnalyticsSettings, MASKED_TOKEN, UpdateAnalyticsSettings};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{
    analytics_api::{AnalyticsApiClient, AnalyticsApiError, parse_base_url},
    http_log::HttpLogStore,
};

#[derive(Debug, Error)]
pub enum AnalyticsSettingsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Api(#[from] AnalyticsApiError),
}

/// Holds the active client; swapped whenever settings are saved
#[derive(Clone)]
pub struct AnalyticsIntegration {
    client: Arc<RwLock<Option<AnalyticsApiClient>>>,
    http_log: HttpLogStore,
}

impl AnalyticsIntegration {
    pub fn new(http_log: HttpLogStore) -> Self {
        Self {
            client: Arc::new(RwLock::new(None)),
            http_log,
        }
    }

    pub fn http_log(&self) -> &HttpLogStore {
        &self.http_log
    }

    /// Build the client from stored settings at startup. A broken configuration
    /// leaves the integration off instead of failing startup.
    pub async fn load(&self, pool: &SqlitePool) -> Result<(), AnalyticsSettingsError> {
        let settings = AnalyticsSettings::get(pool).await?;
        match self.rebuild(&settings).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Analytics integration left disabled");
                Ok(())
            }
        }
    }

    /// Settings with the API token masked
    pub async fn get_settings(pool: &SqlitePool) -> Result<AnalyticsSettings, AnalyticsSettingsError> {
        Ok(AnalyticsSettings::get(pool).await?.masked())
    }

    pub async fn update_settings(
        &self,
        pool: &SqlitePool,
        update: UpdateAnalyticsSettings,
    ) -> Result<AnalyticsSettings, AnalyticsSettingsError> {
        let current = AnalyticsSettings::get(pool).await?;
        let merged = merge_settings(current, update)?;

        // Nothing is stored unless the new client can actually be built.
        let client = self
            .build_client(&merged)
            .map_err(|e| AnalyticsSettingsError::Validation(e.to_string()))?;
        let saved = AnalyticsSettings::save(pool, &merged).await?;
        *self.client.write().await = client;
        info!(
            enabled = saved.enabled,
            provider = %saved.provider,
            "Analytics integration settings updated"
        );
        Ok(saved.masked())
    }

    /// Active client, or `Disabled` when the integration is switched off
    pub async fn client(&self) -> Result<AnalyticsApiClient, AnalyticsApiError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(AnalyticsApiError::Disabled)
    }

    pub async fn is_enabled(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// Health check against the stored settings, even while disabled
    pub async fn test_connection(&self, pool: &SqlitePool) -> Result<(), AnalyticsSettingsError> {
        let settings = AnalyticsSettings::get(pool).await?;
        let client = AnalyticsApiClient::from_settings(&settings, self.http_log.clone())?;
        client.health_check().await?;
        Ok(())
    }

    fn build_client(
        &self,
        settings: &AnalyticsSettings,
    ) -> Result<Option<AnalyticsApiClient>, AnalyticsApiError> {
        if !settings.enabled {
            return Ok(None);
        }
        AnalyticsApiClient::from_settings(settings, self.http_log.clone()).map(Some)
    }

    async fn rebuild(&self, settings: &AnalyticsSettings) -> Result<(), AnalyticsApiError> {
        let client = self.build_client(settings)?;
        *self.client.write().await = client;
        Ok(())
    }
}

fn merge_settings(
    current: AnalyticsSettings,
    update: UpdateAnalyticsSettings,
) -> Result<AnalyticsSettings, AnalyticsSettingsError> {
    let api_token = match update.api_token {
        Some(token) if token == MASKED_TOKEN => current.api_token.clone(),
        Some(token) if token.trim().is_empty() => None,
        Some(token) => Some(token.trim().to_string()),
        None => None,
    };
    let base_url = update
        .base_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    let merged = AnalyticsSettings {
        enabled: update.enabled,
        provider: update
            .provider
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or(current.provider),
        base_url,
        site_id: update.site_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        api_token,
        cache_ttl_seconds: update.cache_ttl_seconds.unwrap_or(current.cache_ttl_seconds),
        rate_limit_per_second: update
            .rate_limit_per_second
            .unwrap_or(current.rate_limit_per_second),
        max_retries: update.max_retries.unwrap_or(current.max_retries),
        timeout_seconds: update.timeout_seconds.unwrap_or(current.timeout_seconds),
        updated_at: current.updated_at,
    };

    validate_settings(&merged)?;
    Ok(merged)
}

fn validate_settings(settings: &AnalyticsSettings) -> Result<(), AnalyticsSettingsError> {
    let invalid = |msg: &str| Err(AnalyticsSettingsError::Validation(msg.to_string()));

    if settings.enabled && settings.base_url.is_none() {
        return invalid("base_url is required when the integration is enabled");
    }
    if let Some(url) = settings.base_url.as_deref() {
        parse_base_url(url).map_err(|e| AnalyticsSettingsError::Validation(e.to_string()))?;
    }
    if !(1..=100).contains(&settings.rate_limit_per_second) {
        return invalid("rate_limit_per_second must be between 1 and 100");
    }
    if !(0..=86_400).contains(&settings.cache_ttl_seconds) {
        return invalid("cache_ttl_seconds must be between 0 and 86400");
    }
    if !(0..=10).contains(&settings.max_retries) {
        return invalid("max_retries must be between 0 and 10");
    }
    if !(1..=300).contains(&settings.timeout_seconds) {
        return invalid("timeout_seconds must be between 1 and 300");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use db::DBService;

    use super::*;

    fn update(enabled: bool, base_url: Option<&str>, token: Option<&str>) -> UpdateAnalyticsSettings {
        UpdateAnalyticsSettings {
            enabled,
            provider: Some("generic".to_string()),
            base_url: base_url.map(str::to_string),
            site_id: Some("1".to_string()),
            api_token: token.map(str::to_string),
            cache_ttl_seconds: None,
            rate_limit_per_second: None,
            max_retries: None,
            timeout_seconds: None,
        }
    }

    #[tokio::test]
    async fn test_defaults_are_disabled() {
        let db = DBService::new_in_memory().await.unwrap();
        let integration = AnalyticsIntegration::new(HttpLogStore::new(10));
        integration.load(&db.pool).await.unwrap();

        assert!(!integration.is_enabled().await);
        assert!(matches!(integration.client().await, Err(AnalyticsApiError::Disabled)));
        let settings = AnalyticsIntegration::get_settings(&db.pool).await.unwrap();
        assert_eq!(settings.cache_ttl_seconds, 300);
        assert_eq!(settings.rate_limit_per_second, 5);
    }

    #[tokio::test]
    async fn test_enable_requires_base_url() {
        let db = DBService::new_in_memory().await.unwrap();
        let integration = AnalyticsIntegration::new(HttpLogStore::new(10));
        let err = integration
            .update_settings(&db.pool, update(true, None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsSettingsError::Validation(_)));

        let err = integration
            .update_settings(&db.pool, update(true, Some("ftp://x.example.com"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsSettingsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_must_be_in_range() {
        let db = DBService::new_in_memory().await.unwrap();
        let integration = AnalyticsIntegration::new(HttpLogStore::new(10));

        for rate in [0, -1, 101] {
            let err = integration
                .update_settings(
                    &db.pool,
                    UpdateAnalyticsSettings {
                        rate_limit_per_second: Some(rate),
                        ..update(true, Some("https://stats.example.com"), None)
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AnalyticsSettingsError::Validation(_)), "rate {rate}");
        }

        for rate in [1, 100] {
            let saved = integration
                .update_settings(
                    &db.pool,
                    UpdateAnalyticsSettings {
                        rate_limit_per_second: Some(rate),
                        ..update(true, Some("https://stats.example.com"), None)
                    },
                )
                .await
                .unwrap();
            assert_eq!(saved.rate_limit_per_second, rate);
        }
    }

    #[tokio::test]
    async fn test_rejected_update_keeps_stored_and_live_settings() {
        let db = DBService::new_in_memory().await.unwrap();
        let integration = AnalyticsIntegration::new(HttpLogStore::new(10));
        integration
            .update_settings(&db.pool, update(true, Some("https://stats.example.com"), Some("s3cret")))
            .await
            .unwrap();
        let before = AnalyticsSettings::get(&db.pool).await.unwrap();

        let err = integration
            .update_settings(
                &db.pool,
                UpdateAnalyticsSettings {
                    rate_limit_per_second: Some(0),
                    ..update(true, Some("https://other.example.com"), Some("n3w"))
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsSettingsError::Validation(_)));

        assert_eq!(AnalyticsSettings::get(&db.pool).await.unwrap(), before);
        let live = integration.client().await.unwrap();
        assert!(format!("{live:?}").contains("stats.example.com"));
    }

    #[tokio::test]
    async fn test_token_is_masked_and_preserved() {
        let db = DBService::new_in_memory().await.unwrap();
        let integration = AnalyticsIntegration::new(HttpLogStore::new(10));

        let saved = integration
            .update_settings(&db.pool, update(true, Some("https://stats.example.com"), Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(saved.api_token.as_deref(), Some(MASKED_TOKEN));
        assert!(integration.is_enabled().await);

        integration
            .update_settings(
                &db.pool,
                update(true, Some("https://stats.example.com"), Some(MASKED_TOKEN)),
            )
            .await
            .unwrap();
        let stored = AnalyticsSettings::get(&db.pool).await.unwrap();
        assert_eq!(stored.api_token.as_deref(), Some("s3cret"));

        integration
            .update_settings(&db.pool, update(false, Some("https://stats.example.com"), None))
            .await
            .unwrap();
        let stored = AnalyticsSettings::get(&db.pool).await.unwrap();
        assert_eq!(stored.api_token, None);
        assert!(!integration.is_enabled().await);
    }
}
