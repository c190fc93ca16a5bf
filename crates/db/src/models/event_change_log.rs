use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// What happened to an event
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "change_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deprecated,
    VersionAdded,
    PlatformUpdated,
    AlertRaised,
    AlertAcknowledged,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventChangeLog {
    pub id: Uuid,
    pub event_id: Uuid,
    pub action: ChangeAction,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Change-log row joined with the event name, for the global activity feed
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventChangeLogWithEvent {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub entry: EventChangeLog,
    pub event_name: String,
}

impl EventChangeLog {
    pub async fn create<'e, E>(
        executor: E,
        event_id: Uuid,
        action: ChangeAction,
        details: Option<String>,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, EventChangeLog>(
            r#"INSERT INTO event_change_logs (id, event_id, action, details)
               VALUES ($1, $2, $3, $4)
               RETURNING id, event_id, action, details, created_at"#,
        )
        .bind(id)
        .bind(event_id)
        .bind(action)
        .bind(details)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_event_id(
        pool: &SqlitePool,
        event_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventChangeLog>(
            r#"SELECT id, event_id, action, details, created_at
               FROM event_change_logs
               WHERE event_id = $1
               ORDER BY created_at DESC, rowid DESC
               LIMIT $2"#,
        )
        .bind(event_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn find_recent(
        pool: &SqlitePool,
        limit: i64,
    ) -> Result<Vec<EventChangeLogWithEvent>, sqlx::Error> {
        sqlx::query_as::<_, EventChangeLogWithEvent>(
            r#"SELECT l.id, l.event_id, l.action, l.details, l.created_at, e.name AS event_name
               FROM event_change_logs l
               JOIN tracking_events e ON e.id = l.event_id
               ORDER BY l.created_at DESC, l.rowid DESC
               LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
