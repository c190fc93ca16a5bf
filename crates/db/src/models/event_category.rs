use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category row plus the number of events filed under it
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventCategoryWithCount {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub category: EventCategory,
    pub event_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateEventCategory {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateEventCategory {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl EventCategory {
    pub async fn find_all_with_counts(
        pool: &SqlitePool,
    ) -> Result<Vec<EventCategoryWithCount>, sqlx::Error> {
        sqlx::query_as::<_, EventCategoryWithCount>(
            r#"SELECT
                c.id, c.name, c.description, c.color, c.created_at, c.updated_at,
                (SELECT COUNT(*) FROM tracking_events e WHERE e.category_id = c.id) AS event_count
            FROM event_categories c
            ORDER BY c.name COLLATE NOCASE ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventCategory>(
            r#"SELECT id, name, description, color, created_at, updated_at
               FROM event_categories
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventCategory>(
            r#"SELECT id, name, description, color, created_at, updated_at
               FROM event_categories
               WHERE name = $1 COLLATE NOCASE"#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        data: &CreateEventCategory,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EventCategory>(
            r#"INSERT INTO event_categories (id, name, description, color)
               VALUES ($1, $2, $3, $4)
               RETURNING id, name, description, color, created_at, updated_at"#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.color)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        name: &str,
        description: Option<&str>,
        color: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EventCategory>(
            r#"UPDATE event_categories
               SET name = $2, description = $3, color = $4, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, name, description, color, created_at, updated_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(color)
        .fetch_one(pool)
        .await
    }

    /// Events in the category survive with `category_id` cleared (ON DELETE SET NULL).
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM event_categories WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
