use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "alert_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Open,
    Acknowledged,
    Resolved,
}

/// Per-event override of the global drop-detection thresholds
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventAlertRule {
    pub event_id: Uuid,
    pub enabled: bool,
    pub drop_threshold_percent: i64,
    pub min_baseline: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpsertEventAlertRule {
    pub enabled: bool,
    pub drop_threshold_percent: i64,
    pub min_baseline: i64,
}

/// A detected day-over-day drop in event volume
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventAlert {
    pub id: Uuid,
    pub event_id: Uuid,
    pub day: NaiveDate,
    pub previous_count: i64,
    pub current_count: i64,
    pub drop_percent: f64,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventAlertWithEvent {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub alert: EventAlert,
    pub event_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct EventAlertFilter {
    pub status: Option<AlertStatus>,
    pub event_id: Option<Uuid>,
    pub limit: Option<i64>,
}

const ALERT_COLUMNS: &str = "a.id, a.event_id, a.day, a.previous_count, a.current_count, a.drop_percent, a.status, a.created_at, a.acknowledged_at, a.resolved_at";

impl EventAlertRule {
    pub async fn find_by_event_id(
        pool: &SqlitePool,
        event_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventAlertRule>(
            r#"SELECT event_id, enabled, drop_threshold_percent, min_baseline, created_at, updated_at
               FROM event_alert_rules
               WHERE event_id = $1"#,
        )
        .bind(event_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create_or_update(
        pool: &SqlitePool,
        event_id: Uuid,
        data: &UpsertEventAlertRule,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EventAlertRule>(
            r#"INSERT INTO event_alert_rules (event_id, enabled, drop_threshold_percent, min_baseline)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT(event_id) DO UPDATE SET
                   enabled = excluded.enabled,
                   drop_threshold_percent = excluded.drop_threshold_percent,
                   min_baseline = excluded.min_baseline,
                   updated_at = datetime('now', 'subsec')
               RETURNING event_id, enabled, drop_threshold_percent, min_baseline, created_at, updated_at"#,
        )
        .bind(event_id)
        .bind(data.enabled)
        .bind(data.drop_threshold_percent)
        .bind(data.min_baseline)
        .fetch_one(pool)
        .await
    }
}

impl EventAlert {
    /// Insert unless an alert for this event and day already exists.
    /// Returns `None` when the alert was raised on an earlier run.
    pub async fn create_if_absent(
        pool: &SqlitePool,
        event_id: Uuid,
        day: NaiveDate,
        previous_count: i64,
        current_count: i64,
        drop_percent: f64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, EventAlert>(
            r#"INSERT INTO event_alerts (id, event_id, day, previous_count, current_count, drop_percent)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT(event_id, day) DO NOTHING
               RETURNING id, event_id, day, previous_count, current_count, drop_percent, status, created_at, acknowledged_at, resolved_at"#,
        )
        .bind(id)
        .bind(event_id)
        .bind(day)
        .bind(previous_count)
        .bind(current_count)
        .bind(drop_percent)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventAlert>(&format!(
            "SELECT {ALERT_COLUMNS} FROM event_alerts a WHERE a.id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_filtered(
        pool: &SqlitePool,
        filter: &EventAlertFilter,
    ) -> Result<Vec<EventAlertWithEvent>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ALERT_COLUMNS}, e.name AS event_name FROM event_alerts a JOIN tracking_events e ON e.id = a.event_id WHERE 1 = 1"
        ));
        if let Some(status) = filter.status {
            query.push(" AND a.status = ").push_bind(status);
        }
        if let Some(event_id) = filter.event_id {
            query.push(" AND a.event_id = ").push_bind(event_id);
        }
        query
            .push(" ORDER BY a.day DESC, a.created_at DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(100).clamp(1, 500));

        query
            .build_query_as::<EventAlertWithEvent>()
            .fetch_all(pool)
            .await
    }

    pub async fn find_open(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventAlert>(&format!(
            "SELECT {ALERT_COLUMNS} FROM event_alerts a WHERE a.status != 'resolved' ORDER BY a.day ASC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: AlertStatus,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EventAlert>(
            r#"UPDATE event_alerts
               SET status = $2,
                   acknowledged_at = CASE
                       WHEN $2 = 'acknowledged' AND acknowledged_at IS NULL THEN datetime('now', 'subsec')
                       ELSE acknowledged_at
                   END,
                   resolved_at = CASE
                       WHEN $2 = 'resolved' THEN datetime('now', 'subsec')
                       ELSE resolved_at
                   END
               WHERE id = $1
               RETURNING id, event_id, day, previous_count, current_count, drop_percent, status, created_at, acknowledged_at, resolved_at"#,
        )
        .bind(id)
        .bind(status)
        .fetch_one(pool)
        .await
    }
}
