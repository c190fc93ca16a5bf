//! Daily event volumes: manual ingest, history and sync from the analytics API.

use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use db::{
    DBService,
    models::{
        event_volume::{DailyCount, EventVolume},
        tracking_event::TrackingEvent,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    analytics_api::{AnalyticsApiClient, AnalyticsApiError},
    analytics_integration::AnalyticsIntegration,
};

pub const DEFAULT_HISTORY_DAYS: u64 = 30;
pub const MAX_INGEST_DAYS: usize = 366;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Api(#[from] AnalyticsApiError),
}

/// Outcome of one sync pass over all live events
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct VolumeSyncReport {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub events_synced: u32,
    pub events_failed: u32,
    pub days_written: u64,
    pub failures: Vec<String>,
}

pub struct VolumeService;

impl VolumeService {
    pub async fn ingest(
        pool: &SqlitePool,
        event_id: Uuid,
        counts: &[DailyCount],
    ) -> Result<u64, VolumeError> {
        if counts.is_empty() {
            return Err(VolumeError::Validation("counts must not be empty".to_string()));
        }
        if counts.len() > MAX_INGEST_DAYS {
            return Err(VolumeError::Validation(format!(
                "at most {MAX_INGEST_DAYS} days can be ingested at once"
            )));
        }
        if let Some(bad) = counts.iter().find(|c| c.count < 0) {
            return Err(VolumeError::Validation(format!(
                "count for {} cannot be negative",
                bad.day
            )));
        }
        if TrackingEvent::find_by_id(pool, event_id).await?.is_none() {
            return Err(VolumeError::NotFound("event"));
        }
        Ok(EventVolume::upsert_many(pool, event_id, counts).await?)
    }

    /// Inclusive range; defaults to the last 30 days ending today
    pub async fn history(
        pool: &SqlitePool,
        event_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<EventVolume>, VolumeError> {
        if TrackingEvent::find_by_id(pool, event_id).await?.is_none() {
            return Err(VolumeError::NotFound("event"));
        }
        let to = to.unwrap_or_else(|| Utc::now().date_naive());
        let from = from
            .or_else(|| to.checked_sub_days(Days::new(DEFAULT_HISTORY_DAYS)))
            .unwrap_or(to);
        if from > to {
            return Err(VolumeError::Validation("'from' must not be after 'to'".to_string()));
        }
        Ok(EventVolume::find_range(pool, event_id, from, to).await?)
    }

    /// Pull the last `lookback_days` full days (ending yesterday) for every live
    /// event. One failing event does not stop the others.
    pub async fn sync_from_analytics(
        pool: &SqlitePool,
        client: &AnalyticsApiClient,
        lookback_days: u64,
        today: NaiveDate,
    ) -> Result<VolumeSyncReport, VolumeError> {
        let (Some(to), Some(from)) = (
            today.checked_sub_days(Days::new(1)),
            today.checked_sub_days(Days::new(lookback_days.max(1))),
        ) else {
            return Ok(VolumeSyncReport::default());
        };

        let mut report = VolumeSyncReport {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        };

        for event in TrackingEvent::find_not_deprecated(pool).await? {
            match client.fetch_daily_counts(&event.name, from, to).await {
                Ok(counts) => {
                    let counts: Vec<DailyCount> = counts
                        .into_iter()
                        .filter(|c| c.day >= from && c.day <= to && c.count >= 0)
                        .collect();
                    if !counts.is_empty() {
                        report.days_written +=
                            EventVolume::upsert_many(pool, event.id, &counts).await?;
                    }
                    report.events_synced += 1;
                }
                Err(AnalyticsApiError::Unauthorized) => {
                    return Err(VolumeError::Api(AnalyticsApiError::Unauthorized));
                }
                Err(e) => {
                    warn!(event = %event.name, error = %e, "Volume sync failed for event");
                    report.events_failed += 1;
                    report.failures.push(format!("{}: {}", event.name, e));
                }
            }
        }

        info!(
            from = %from,
            to = %to,
            synced = report.events_synced,
            failed = report.events_failed,
            days_written = report.days_written,
            "Volume sync finished"
        );
        Ok(report)
    }
}

/// Background service that periodically syncs volumes while the integration is on
pub struct VolumeSyncService {
    db: DBService,
    integration: AnalyticsIntegration,
    poll_interval: Duration,
    lookback_days: u64,
}

impl VolumeSyncService {
    /// Spawn the background volume sync service
    pub async fn spawn(
        db: DBService,
        integration: AnalyticsIntegration,
        poll_interval: Duration,
        lookback_days: u64,
    ) -> tokio::task::JoinHandle<()> {
        let service = Self {
            db,
            integration,
            poll_interval,
            lookback_days,
        };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting volume sync service with interval {:?}, lookback: {} days",
            self.poll_interval, self.lookback_days
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            let client = match self.integration.client().await {
                Ok(client) => client,
                Err(_) => {
                    debug!("Volume sync: analytics integration disabled");
                    continue;
                }
            };
            if let Err(e) = VolumeService::sync_from_analytics(
                &self.db.pool,
                &client,
                self.lookback_days,
                Utc::now().date_naive(),
            )
            .await
            {
                error!("Error syncing event volumes: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, extract::Query, routing::get};
    use db::models::{
        analytics_settings::AnalyticsSettings, tracking_event::CreateTrackingEvent,
    };

    use super::*;
    use crate::services::{event_catalog::EventCatalogService, http_log::HttpLogStore};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn create_event(pool: &SqlitePool, name: &str) -> Uuid {
        EventCatalogService::create(
            pool,
            CreateTrackingEvent {
                name: name.to_string(),
                display_name: None,
                description: None,
                category_id: None,
                owner_team: None,
                status: None,
                tags: None,
                properties: None,
            },
        )
        .await
        .unwrap()
        .event
        .id
    }

    #[derive(serde::Deserialize)]
    struct CountsQuery {
        event: String,
        from: NaiveDate,
        to: NaiveDate,
    }

    async fn stub_counts(Query(q): Query<CountsQuery>) -> Result<Json<serde_json::Value>, axum::http::StatusCode> {
        if q.event == "broken_event" {
            return Err(axum::http::StatusCode::BAD_REQUEST);
        }
        let mut counts = Vec::new();
        let mut d = q.from;
        while d <= q.to {
            counts.push(serde_json::json!({"day": d, "count": 100}));
            d = d.succ_opt().unwrap();
        }
        Ok(Json(serde_json::json!({ "counts": counts })))
    }

    #[tokio::test]
    async fn test_ingest_validates_and_upserts() {
        let db = DBService::new_in_memory().await.unwrap();
        let event = create_event(&db.pool, "checkout_completed").await;

        let bad = VolumeService::ingest(
            &db.pool,
            event,
            &[DailyCount {
                day: day("2025-06-01"),
                count: -1,
            }],
        )
        .await;
        assert!(matches!(bad, Err(VolumeError::Validation(_))));

        VolumeService::ingest(
            &db.pool,
            event,
            &[DailyCount {
                day: day("2025-06-01"),
                count: 10,
            }],
        )
        .await
        .unwrap();
        VolumeService::ingest(
            &db.pool,
            event,
            &[DailyCount {
                day: day("2025-06-01"),
                count: 25,
            }],
        )
        .await
        .unwrap();

        let history =
            VolumeService::history(&db.pool, event, Some(day("2025-05-01")), Some(day("2025-06-30")))
                .await
                .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].count, 25);

        let missing = VolumeService::ingest(&db.pool, Uuid::new_v4(), &[DailyCount {
            day: day("2025-06-01"),
            count: 1,
        }])
        .await;
        assert!(matches!(missing, Err(VolumeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sync_from_analytics_writes_lookback_window() {
        let db = DBService::new_in_memory().await.unwrap();
        let good = create_event(&db.pool, "screen_viewed").await;
        create_event(&db.pool, "broken_event").await;

        let app = Router::new().route("/events/counts", get(stub_counts));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let settings = AnalyticsSettings {
            enabled: true,
            provider: "generic".to_string(),
            base_url: Some(format!("http://{addr}")),
            site_id: None,
            api_token: None,
            cache_ttl_seconds: 60,
            rate_limit_per_second: 100,
            max_retries: 0,
            timeout_seconds: 5,
            updated_at: Utc::now(),
        };
        let client = AnalyticsApiClient::from_settings(&settings, HttpLogStore::new(20)).unwrap();

        let report = VolumeService::sync_from_analytics(&db.pool, &client, 3, day("2025-06-10"))
            .await
            .unwrap();
        assert_eq!(report.from, Some(day("2025-06-07")));
        assert_eq!(report.to, Some(day("2025-06-09")));
        assert_eq!(report.events_synced, 1);
        assert_eq!(report.events_failed, 1);
        assert_eq!(report.days_written, 3);

        let history =
            VolumeService::history(&db.pool, good, Some(day("2025-06-01")), Some(day("2025-06-10")))
                .await
                .unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|v| v.count == 100));
    }
}
