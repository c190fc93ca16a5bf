//! Process configuration read from the environment.

use std::{str::FromStr, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub alert_poll_interval: Duration,
    pub alert_drop_threshold_percent: i64,
    pub alert_min_baseline: i64,
    pub volume_sync_interval: Duration,
    pub volume_sync_lookback_days: i64,
    pub http_log_capacity: usize,
    pub alert_webhook_url: Option<String>,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            database_url: "sqlite://trackplan.db?mode=rwc".to_string(),
            alert_poll_interval: Duration::from_secs(3600),
            alert_drop_threshold_percent: 50,
            alert_min_baseline: 100,
            volume_sync_interval: Duration::from_secs(3600),
            volume_sync_lookback_days: 3,
            http_log_capacity: 500,
            alert_webhook_url: None,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let threshold: i64 = parse_or(&get, "ALERT_DROP_THRESHOLD_PERCENT", defaults.alert_drop_threshold_percent)?;
        if !(1..=100).contains(&threshold) {
            return Err(ConfigError::Invalid {
                name: "ALERT_DROP_THRESHOLD_PERCENT",
                value: threshold.to_string(),
            });
        }

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "PORT", defaults.port)?,
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            alert_poll_interval: Duration::from_secs(parse_or(
                &get,
                "ALERT_POLL_INTERVAL_SECS",
                defaults.alert_poll_interval.as_secs(),
            )?),
            alert_drop_threshold_percent: threshold,
            alert_min_baseline: parse_or(&get, "ALERT_MIN_BASELINE", defaults.alert_min_baseline)?
                .max(0),
            volume_sync_interval: Duration::from_secs(parse_or(
                &get,
                "VOLUME_SYNC_INTERVAL_SECS",
                defaults.volume_sync_interval.as_secs(),
            )?),
            volume_sync_lookback_days: parse_or(
                &get,
                "VOLUME_SYNC_LOOKBACK_DAYS",
                defaults.volume_sync_lookback_days,
            )?
            .clamp(1, 90),
            http_log_capacity: parse_or(&get, "HTTP_LOG_CAPACITY", defaults.http_log_capacity)?.max(1),
            alert_webhook_url: get("ALERT_WEBHOOK_URL"),
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.alert_drop_threshold_percent, 50);
        assert_eq!(config.http_log_capacity, 500);
        assert!(config.cors_allowed_origins.is_empty());
        assert!(config.alert_webhook_url.is_none());
    }

    #[test]
    fn test_overrides_and_lists() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("ALERT_POLL_INTERVAL_SECS", "60"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:5173, https://admin.example.com,"),
            ("ALERT_WEBHOOK_URL", "https://hooks.example.com/alerts"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.alert_poll_interval, Duration::from_secs(60));
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://localhost:5173", "https://admin.example.com"]
        );
        assert_eq!(
            config.alert_webhook_url.as_deref(),
            Some("https://hooks.example.com/alerts")
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("PORT", "not-a-port")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ALERT_DROP_THRESHOLD_PERCENT", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ALERT_DROP_THRESHOLD_PERCENT", "150")])).is_err());
    }
}
