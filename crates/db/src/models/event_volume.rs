use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Number of times an event fired on one calendar day
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, TS)]
pub struct EventVolume {
    pub event_id: Uuid,
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct IngestEventVolumes {
    pub counts: Vec<DailyCount>,
}

impl EventVolume {
    /// Insert or replace the count for each day; returns rows written
    pub async fn upsert_many(
        pool: &SqlitePool,
        event_id: Uuid,
        counts: &[DailyCount],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut written = 0;
        for entry in counts {
            let result = sqlx::query(
                r#"INSERT INTO event_volumes (event_id, day, count)
                   VALUES ($1, $2, $3)
                   ON CONFLICT(event_id, day) DO UPDATE SET
                       count = excluded.count,
                       updated_at = datetime('now', 'subsec')"#,
            )
            .bind(event_id)
            .bind(entry.day)
            .bind(entry.count)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    pub async fn find_range(
        pool: &SqlitePool,
        event_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventVolume>(
            r#"SELECT event_id, day, count
               FROM event_volumes
               WHERE event_id = $1 AND day >= $2 AND day <= $3
               ORDER BY day ASC"#,
        )
        .bind(event_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    pub async fn find_count(
        pool: &SqlitePool,
        event_id: Uuid,
        day: NaiveDate,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT count FROM event_volumes WHERE event_id = $1 AND day = $2",
        )
        .bind(event_id)
        .bind(day)
        .fetch_optional(pool)
        .await
    }
}
