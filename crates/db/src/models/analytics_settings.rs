use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;

pub const MASKED_TOKEN: &str = "********";

/// Connection settings for the external analytics API (single row, id = 1)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, TS)]
pub struct AnalyticsSettings {
    pub enabled: bool,
    pub provider: String,
    pub base_url: Option<String>,
    pub site_id: Option<String>,
    pub api_token: Option<String>,
    pub cache_ttl_seconds: i64,
    pub rate_limit_per_second: i64,
    pub max_retries: i64,
    pub timeout_seconds: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateAnalyticsSettings {
    pub enabled: bool,
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub site_id: Option<String>,
    /// `"********"` keeps the stored token, `null` clears it.
    pub api_token: Option<String>,
    pub cache_ttl_seconds: Option<i64>,
    pub rate_limit_per_second: Option<i64>,
    pub max_retries: Option<i64>,
    pub timeout_seconds: Option<i64>,
}

impl AnalyticsSettings {
    /// Copy safe to hand to API clients
    pub fn masked(&self) -> Self {
        Self {
            api_token: self.api_token.as_ref().map(|_| MASKED_TOKEN.to_string()),
            ..self.clone()
        }
    }

    pub async fn get(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AnalyticsSettings>(
            r#"SELECT enabled, provider, base_url, site_id, api_token, cache_ttl_seconds,
                      rate_limit_per_second, max_retries, timeout_seconds, updated_at
               FROM analytics_settings
               WHERE id = 1"#,
        )
        .fetch_one(pool)
        .await
    }

    pub async fn save(pool: &SqlitePool, settings: &AnalyticsSettings) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AnalyticsSettings>(
            r#"UPDATE analytics_settings
               SET enabled = $1, provider = $2, base_url = $3, site_id = $4, api_token = $5,
                   cache_ttl_seconds = $6, rate_limit_per_second = $7, max_retries = $8,
                   timeout_seconds = $9, updated_at = datetime('now', 'subsec')
               WHERE id = 1
               RETURNING enabled, provider, base_url, site_id, api_token, cache_ttl_seconds,
                         rate_limit_per_second, max_retries, timeout_seconds, updated_at"#,
        )
        .bind(settings.enabled)
        .bind(&settings.provider)
        .bind(&settings.base_url)
        .bind(&settings.site_id)
        .bind(&settings.api_token)
        .bind(settings.cache_ttl_seconds)
        .bind(settings.rate_limit_per_second)
        .bind(settings.max_retries)
        .bind(settings.timeout_seconds)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_token_only_when_present() {
        let settings = AnalyticsSettings {
            enabled: true,
            provider: "generic".to_string(),
            base_url: Some("https://analytics.example.com".to_string()),
            site_id: Some("7".to_string()),
            api_token: Some("secret".to_string()),
            cache_ttl_seconds: 300,
            rate_limit_per_second: 5,
            max_retries: 3,
            timeout_seconds: 30,
            updated_at: Utc::now(),
        };
        assert_eq!(settings.masked().api_token.as_deref(), Some(MASKED_TOKEN));

        let without = AnalyticsSettings {
            api_token: None,
            ..settings
        };
        assert_eq!(without.masked().api_token, None);
    }
}
