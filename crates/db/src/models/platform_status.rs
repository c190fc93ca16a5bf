use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool, Type};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display, EnumIter,
)]
#[sqlx(type_name = "platform", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Web,
    Ios,
    Android,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "implementation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImplementationStatus {
    #[default]
    NotImplemented,
    InProgress,
    Implemented,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "validation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PlatformStatus {
    pub event_id: Uuid,
    pub platform: Platform,
    pub implementation_status: ImplementationStatus,
    pub validation_status: ValidationStatus,
    pub implemented_version: Option<i64>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdatePlatformStatus {
    pub implementation_status: Option<ImplementationStatus>,
    pub validation_status: Option<ValidationStatus>,
    pub notes: Option<String>,
}

/// Per-platform rollup of implementation and validation progress
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PlatformCoverage {
    pub platform: Platform,
    pub total_events: i64,
    pub not_implemented: i64,
    pub in_progress: i64,
    pub implemented: i64,
    pub validation_pending: i64,
    pub valid: i64,
    pub invalid: i64,
}

impl PlatformCoverage {
    fn empty(platform: Platform) -> Self {
        Self {
            platform,
            total_events: 0,
            not_implemented: 0,
            in_progress: 0,
            implemented: 0,
            validation_pending: 0,
            valid: 0,
            invalid: 0,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct CoverageRow {
    platform: Platform,
    implementation_status: ImplementationStatus,
    validation_status: ValidationStatus,
    count: i64,
}

impl PlatformStatus {
    /// One row per platform, all starting from `not_implemented` / `pending`
    pub async fn create_defaults<'e, E>(executor: E, event_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let mut builder = sqlx::QueryBuilder::<Sqlite>::new(
            "INSERT INTO event_platform_statuses (event_id, platform) ",
        );
        builder.push_values(Platform::iter(), |mut row, platform| {
            row.push_bind(event_id).push_bind(platform);
        });
        let result = builder.build().execute(executor).await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_event_id(
        pool: &SqlitePool,
        event_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PlatformStatus>(
            r#"SELECT event_id, platform, implementation_status, validation_status, implemented_version, notes, updated_at
               FROM event_platform_statuses
               WHERE event_id = $1
               ORDER BY CASE platform WHEN 'web' THEN 0 WHEN 'ios' THEN 1 ELSE 2 END"#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find(
        pool: &SqlitePool,
        event_id: Uuid,
        platform: Platform,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PlatformStatus>(
            r#"SELECT event_id, platform, implementation_status, validation_status, implemented_version, notes, updated_at
               FROM event_platform_statuses
               WHERE event_id = $1 AND platform = $2"#,
        )
        .bind(event_id)
        .bind(platform)
        .fetch_optional(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        event_id: Uuid,
        platform: Platform,
        implementation_status: ImplementationStatus,
        validation_status: ValidationStatus,
        implemented_version: Option<i64>,
        notes: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PlatformStatus>(
            r#"UPDATE event_platform_statuses
               SET implementation_status = $3,
                   validation_status = $4,
                   implemented_version = $5,
                   notes = $6,
                   updated_at = datetime('now', 'subsec')
               WHERE event_id = $1 AND platform = $2
               RETURNING event_id, platform, implementation_status, validation_status, implemented_version, notes, updated_at"#,
        )
        .bind(event_id)
        .bind(platform)
        .bind(implementation_status)
        .bind(validation_status)
        .bind(implemented_version)
        .bind(notes)
        .fetch_one(pool)
        .await
    }

    /// A schema change invalidates earlier validation: implemented platforms drop
    /// back to in-progress and every platform needs validating again.
    pub async fn reset_for_new_version<'e, E>(executor: E, event_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE event_platform_statuses
               SET implementation_status = CASE
                       WHEN implementation_status = 'implemented' THEN 'in_progress'
                       ELSE implementation_status
                   END,
                   validation_status = 'pending',
                   updated_at = datetime('now', 'subsec')
               WHERE event_id = $1"#,
        )
        .bind(event_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Coverage across non-deprecated events, one entry per platform
    pub async fn coverage(pool: &SqlitePool) -> Result<Vec<PlatformCoverage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CoverageRow>(
            r#"SELECT p.platform, p.implementation_status, p.validation_status, COUNT(*) AS count
               FROM event_platform_statuses p
               JOIN tracking_events e ON e.id = p.event_id
               WHERE e.status != 'deprecated'
               GROUP BY p.platform, p.implementation_status, p.validation_status"#,
        )
        .fetch_all(pool)
        .await?;

        Ok(Platform::iter()
            .map(|platform| {
                let mut coverage = PlatformCoverage::empty(platform);
                for row in rows.iter().filter(|r| r.platform == platform) {
                    coverage.total_events += row.count;
                    match row.implementation_status {
                        ImplementationStatus::NotImplemented => coverage.not_implemented += row.count,
                        ImplementationStatus::InProgress => coverage.in_progress += row.count,
                        ImplementationStatus::Implemented => coverage.implemented += row.count,
                    }
                    match row.validation_status {
                        ValidationStatus::Pending => coverage.validation_pending += row.count,
                        ValidationStatus::Valid => coverage.valid += row.count,
                        ValidationStatus::Invalid => coverage.invalid += row.count,
                    }
                }
                coverage
            })
            .collect())
    }
}
