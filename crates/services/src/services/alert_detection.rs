//! Day-over-day event volume drop detection and the alert lifecycle.

use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use db::{
    DBService,
    models::{
        alert::{
            AlertStatus, EventAlert, EventAlertFilter, EventAlertRule, EventAlertWithEvent,
            UpsertEventAlertRule,
        },
        event_change_log::{ChangeAction, EventChangeLog},
        event_volume::EventVolume,
        tracking_event::TrackingEvent,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info};
use ts_rs::TS;
use uuid::Uuid;

use super::notification::NotificationService;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
}

/// Thresholds applied to events without their own rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertThresholds {
    pub drop_threshold_percent: i64,
    pub min_baseline: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            drop_threshold_percent: 50,
            min_baseline: 100,
        }
    }
}

/// The rule actually in force for an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct EffectiveAlertRule {
    pub event_id: Uuid,
    pub enabled: bool,
    pub drop_threshold_percent: i64,
    pub min_baseline: i64,
    pub is_default: bool,
}

/// Percentage drop from `previous` to `current`, rounded to one decimal, when it
/// is large enough to alert on. Baselines below `min_baseline` are too noisy to
/// judge and never alert.
pub fn detect_drop(previous: i64, current: i64, threshold_percent: i64, min_baseline: i64) -> Option<f64> {
    if previous <= 0 || previous < min_baseline || current >= previous {
        return None;
    }
    let dropped = previous - current.max(0);
    // Counts can be anywhere in i64, so widen before scaling.
    if i128::from(dropped) * 100 < i128::from(threshold_percent) * i128::from(previous) {
        return None;
    }
    let percent = dropped as f64 * 100.0 / previous as f64;
    Some((percent * 10.0).round() / 10.0)
}

pub struct AlertService;

impl AlertService {
    pub async fn effective_rule(
        pool: &SqlitePool,
        event_id: Uuid,
        defaults: AlertThresholds,
    ) -> Result<EffectiveAlertRule, AlertError> {
        if TrackingEvent::find_by_id(pool, event_id).await?.is_none() {
            return Err(AlertError::NotFound("event"));
        }
        Ok(match EventAlertRule::find_by_event_id(pool, event_id).await? {
            Some(rule) => EffectiveAlertRule {
                event_id,
                enabled: rule.enabled,
                drop_threshold_percent: rule.drop_threshold_percent,
                min_baseline: rule.min_baseline,
                is_default: false,
            },
            None => EffectiveAlertRule {
                event_id,
                enabled: true,
                drop_threshold_percent: defaults.drop_threshold_percent,
                min_baseline: defaults.min_baseline,
                is_default: true,
            },
        })
    }

    pub async fn upsert_rule(
        pool: &SqlitePool,
        event_id: Uuid,
        data: UpsertEventAlertRule,
    ) -> Result<EffectiveAlertRule, AlertError> {
        if !(1..=100).contains(&data.drop_threshold_percent) {
            return Err(AlertError::Validation(
                "drop_threshold_percent must be between 1 and 100".to_string(),
            ));
        }
        if data.min_baseline < 0 {
            return Err(AlertError::Validation("min_baseline cannot be negative".to_string()));
        }
        if TrackingEvent::find_by_id(pool, event_id).await?.is_none() {
            return Err(AlertError::NotFound("event"));
        }

        let rule = EventAlertRule::create_or_update(pool, event_id, &data).await?;
        Ok(EffectiveAlertRule {
            event_id,
            enabled: rule.enabled,
            drop_threshold_percent: rule.drop_threshold_percent,
            min_baseline: rule.min_baseline,
            is_default: false,
        })
    }

    /// Compare `day` against the day before for every live event. Re-running for
    /// the same day raises nothing new.
    pub async fn run_detection(
        pool: &SqlitePool,
        notification_service: &NotificationService,
        defaults: AlertThresholds,
        day: NaiveDate,
    ) -> Result<Vec<EventAlert>, AlertError> {
        let Some(previous_day) = day.checked_sub_days(Days::new(1)) else {
            return Ok(Vec::new());
        };

        let events = TrackingEvent::find_not_deprecated(pool).await?;
        let mut raised = Vec::new();

        for event in events {
            let rule = Self::effective_rule(pool, event.id, defaults).await?;
            if !rule.enabled {
                continue;
            }
            let Some(previous) = EventVolume::find_count(pool, event.id, previous_day).await? else {
                debug!(event = %event.name, day = %previous_day, "No baseline volume, skipping");
                continue;
            };
            let current = EventVolume::find_count(pool, event.id, day).await?.unwrap_or(0);

            let Some(drop_percent) =
                detect_drop(previous, current, rule.drop_threshold_percent, rule.min_baseline)
            else {
                continue;
            };

            let Some(alert) =
                EventAlert::create_if_absent(pool, event.id, day, previous, current, drop_percent).await?
            else {
                continue;
            };

            EventChangeLog::create(
                pool,
                event.id,
                ChangeAction::AlertRaised,
                Some(format!("-{drop_percent}% on {day} ({previous} -> {current})")),
            )
            .await?;
            info!(
                event = %event.name,
                day = %day,
                previous,
                current,
                drop_percent,
                "Event volume drop detected"
            );
            notification_service
                .notify(
                    "Event volume drop",
                    &format!(
                        "'{}' dropped {}% on {} ({} -> {})",
                        event.name, drop_percent, day, previous, current
                    ),
                )
                .await;
            raised.push(alert);
        }

        Ok(raised)
    }

    /// Close unresolved alerts whose event is back to its pre-drop volume on `day`
    pub async fn resolve_recovered(pool: &SqlitePool, day: NaiveDate) -> Result<Vec<EventAlert>, AlertError> {
        let mut resolved = Vec::new();
        for alert in EventAlert::find_open(pool).await? {
            if alert.day >= day {
                continue;
            }
            let Some(count) = EventVolume::find_count(pool, alert.event_id, day).await? else {
                continue;
            };
            if count >= alert.previous_count {
                info!(alert_id = %alert.id, day = %day, count, "Event volume recovered, resolving alert");
                resolved.push(EventAlert::update_status(pool, alert.id, AlertStatus::Resolved).await?);
            }
        }
        Ok(resolved)
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &EventAlertFilter,
    ) -> Result<Vec<EventAlertWithEvent>, AlertError> {
        Ok(EventAlert::find_filtered(pool, filter).await?)
    }

    pub async fn acknowledge(pool: &SqlitePool, id: Uuid) -> Result<EventAlert, AlertError> {
        let alert = EventAlert::find_by_id(pool, id)
            .await?
            .ok_or(AlertError::NotFound("alert"))?;
        if alert.status != AlertStatus::Open {
            return Err(AlertError::Validation(format!(
                "only open alerts can be acknowledged; this one is {}",
                alert.status
            )));
        }
        let alert = EventAlert::update_status(pool, id, AlertStatus::Acknowledged).await?;
        EventChangeLog::create(
            pool,
            alert.event_id,
            ChangeAction::AlertAcknowledged,
            Some(format!("alert for {}", alert.day)),
        )
        .await?;
        Ok(alert)
    }

    pub async fn resolve(pool: &SqlitePool, id: Uuid) -> Result<EventAlert, AlertError> {
        let alert = EventAlert::find_by_id(pool, id)
            .await?
            .ok_or(AlertError::NotFound("alert"))?;
        if alert.status == AlertStatus::Resolved {
            return Ok(alert);
        }
        Ok(EventAlert::update_status(pool, id, AlertStatus::Resolved).await?)
    }
}

/// Background service that checks yesterday's volumes on a fixed interval
pub struct AlertDetectionService {
    db: DBService,
    notification_service: NotificationService,
    thresholds: AlertThresholds,
    poll_interval: Duration,
}

impl AlertDetectionService {
    /// Spawn the background alert detection service
    pub async fn spawn(
        db: DBService,
        notification_service: NotificationService,
        thresholds: AlertThresholds,
        poll_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let service = Self {
            db,
            notification_service,
            thresholds,
            poll_interval,
        };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting alert detection service with interval {:?}, threshold: {}%, min baseline: {}",
            self.poll_interval, self.thresholds.drop_threshold_percent, self.thresholds.min_baseline
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.check_yesterday().await {
                error!("Error running alert detection: {}", e);
            }
        }
    }

    async fn check_yesterday(&self) -> Result<(), AlertError> {
        let today = Utc::now().date_naive();
        let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
            return Ok(());
        };

        let resolved = AlertService::resolve_recovered(&self.db.pool, yesterday).await?;
        let raised = AlertService::run_detection(
            &self.db.pool,
            &self.notification_service,
            self.thresholds,
            yesterday,
        )
        .await?;

        if raised.is_empty() && resolved.is_empty() {
            debug!(day = %yesterday, "Alert detection: no changes");
        } else {
            info!(
                day = %yesterday,
                raised = raised.len(),
                resolved = resolved.len(),
                "Alert detection finished"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use db::models::{
        event_volume::DailyCount,
        tracking_event::CreateTrackingEvent,
    };

    use super::*;
    use crate::services::event_catalog::EventCatalogService;

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

    async fn ingest(pool: &SqlitePool, event_id: Uuid, counts: &[(&str, i64)]) {
        let counts: Vec<DailyCount> = counts
            .iter()
            .map(|(d, count)| DailyCount {
                day: day(d),
                count: *count,
            })
            .collect();
        EventVolume::upsert_many(pool, event_id, &counts).await.unwrap();
    }

    #[test]
    fn test_detect_drop_thresholds() {
        assert_eq!(detect_drop(1000, 400, 50, 100), Some(60.0));
        assert_eq!(detect_drop(1000, 500, 50, 100), Some(50.0));
        assert_eq!(detect_drop(1000, 501, 50, 100), None);
        assert_eq!(detect_drop(3, 2, 10, 0), Some(33.3));
        assert_eq!(detect_drop(1000, 0, 50, 100), Some(100.0));
    }

    #[test]
    fn test_detect_drop_handles_huge_counts() {
        let big = i64::MAX / 10;
        assert_eq!(detect_drop(big, 0, 50, 100), Some(100.0));
        assert_eq!(detect_drop(200_000_000_000_000_000, 0, 50, 100), Some(100.0));
        assert_eq!(detect_drop(i64::MAX, i64::MAX / 2, 50, 100), Some(50.0));
        assert_eq!(detect_drop(i64::MAX, i64::MAX - 1, 50, 100), None);
    }

    #[tokio::test]
    async fn test_run_detection_with_huge_volumes() {
        let db = DBService::new_in_memory().await.unwrap();
        let event = create_event(&db.pool, "bulk_import_row").await;
        ingest(
            &db.pool,
            event,
            &[("2025-06-01", 200_000_000_000_000_000), ("2025-06-02", 0)],
        )
        .await;

        let raised = AlertService::run_detection(
            &db.pool,
            &NotificationService::new(None),
            AlertThresholds::default(),
            day("2025-06-02"),
        )
        .await
        .unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].drop_percent, 100.0);
    }

    #[test]
    fn test_detect_drop_ignores_small_or_growing_volumes() {
        assert_eq!(detect_drop(99, 0, 50, 100), None);
        assert_eq!(detect_drop(0, 0, 50, 0), None);
        assert_eq!(detect_drop(500, 500, 1, 0), None);
        assert_eq!(detect_drop(500, 900, 1, 0), None);
    }

    #[tokio::test]
    async fn test_run_detection_raises_once_per_day() {
        let db = DBService::new_in_memory().await.unwrap();
        let notifications = NotificationService::new(None);
        let checkout = create_event(&db.pool, "checkout_completed").await;
        let steady = create_event(&db.pool, "screen_viewed").await;
        let no_baseline = create_event(&db.pool, "signup_started").await;

        ingest(&db.pool, checkout, &[("2025-06-01", 1000), ("2025-06-02", 200)]).await;
        ingest(&db.pool, steady, &[("2025-06-01", 1000), ("2025-06-02", 950)]).await;
        ingest(&db.pool, no_baseline, &[("2025-06-02", 10)]).await;

        let raised = AlertService::run_detection(
            &db.pool,
            &notifications,
            AlertThresholds::default(),
            day("2025-06-02"),
        )
        .await
        .unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].event_id, checkout);
        assert_eq!(raised[0].drop_percent, 80.0);
        assert_eq!(raised[0].status, AlertStatus::Open);

        let again = AlertService::run_detection(
            &db.pool,
            &notifications,
            AlertThresholds::default(),
            day("2025-06-02"),
        )
        .await
        .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_missing_current_day_counts_as_zero() {
        let db = DBService::new_in_memory().await.unwrap();
        let event = create_event(&db.pool, "app_opened").await;
        ingest(&db.pool, event, &[("2025-06-01", 5000)]).await;

        let raised = AlertService::run_detection(
            &db.pool,
            &NotificationService::new(None),
            AlertThresholds::default(),
            day("2025-06-02"),
        )
        .await
        .unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].current_count, 0);
        assert_eq!(raised[0].drop_percent, 100.0);
    }

    #[tokio::test]
    async fn test_rules_override_and_disable() {
        let db = DBService::new_in_memory().await.unwrap();
        let strict = create_event(&db.pool, "purchase_made").await;
        let muted = create_event(&db.pool, "debug_ping").await;
        ingest(&db.pool, strict, &[("2025-06-01", 50), ("2025-06-02", 40)]).await;
        ingest(&db.pool, muted, &[("2025-06-01", 1000), ("2025-06-02", 0)]).await;

        AlertService::upsert_rule(
            &db.pool,
            strict,
            UpsertEventAlertRule {
                enabled: true,
                drop_threshold_percent: 10,
                min_baseline: 10,
            },
        )
        .await
        .unwrap();
        AlertService::upsert_rule(
            &db.pool,
            muted,
            UpsertEventAlertRule {
                enabled: false,
                drop_threshold_percent: 50,
                min_baseline: 0,
            },
        )
        .await
        .unwrap();

        let raised = AlertService::run_detection(
            &db.pool,
            &NotificationService::new(None),
            AlertThresholds::default(),
            day("2025-06-02"),
        )
        .await
        .unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].event_id, strict);
        assert_eq!(raised[0].drop_percent, 20.0);

        let rule = AlertService::effective_rule(&db.pool, muted, AlertThresholds::default())
            .await
            .unwrap();
        assert!(!rule.enabled);
        assert!(!rule.is_default);
    }

    #[tokio::test]
    async fn test_upsert_rule_validates_threshold() {
        let db = DBService::new_in_memory().await.unwrap();
        let event = create_event(&db.pool, "page_viewed").await;
        let err = AlertService::upsert_rule(
            &db.pool,
            event,
            UpsertEventAlertRule {
                enabled: true,
                drop_threshold_percent: 0,
                min_baseline: 0,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AlertError::Validation(_)));
    }

    #[tokio::test]
    async fn test_alert_lifecycle_and_auto_resolve() {
        let db = DBService::new_in_memory().await.unwrap();
        let event = create_event(&db.pool, "search_performed").await;
        ingest(&db.pool, event, &[("2025-06-01", 800), ("2025-06-02", 100)]).await;

        let raised = AlertService::run_detection(
            &db.pool,
            &NotificationService::new(None),
            AlertThresholds::default(),
            day("2025-06-02"),
        )
        .await
        .unwrap();
        let alert_id = raised[0].id;

        let acked = AlertService::acknowledge(&db.pool, alert_id).await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert!(acked.acknowledged_at.is_some());
        assert!(AlertService::acknowledge(&db.pool, alert_id).await.is_err());

        ingest(&db.pool, event, &[("2025-06-03", 850)]).await;
        let resolved = AlertService::resolve_recovered(&db.pool, day("2025-06-03")).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, AlertStatus::Resolved);
        assert!(resolved[0].resolved_at.is_some());

        let open = AlertService::list(
            &db.pool,
            &EventAlertFilter {
                status: Some(AlertStatus::Open),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(open.is_empty());
    }
}
