use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "property_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

/// One property in an event payload schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct PropertyDefinition {
    pub name: String,
    pub property_type: PropertyType,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EventVersion {
    pub id: Uuid,
    pub event_id: Uuid,
    pub version: i64,
    #[ts(type = "Array<PropertyDefinition>")]
    pub properties: Json<Vec<PropertyDefinition>>,
    pub changelog: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateEventVersion {
    pub properties: Vec<PropertyDefinition>,
    pub changelog: Option<String>,
}

/// Property-level difference between two versions of one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct EventVersionDiff {
    pub from_version: i64,
    pub to_version: i64,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl EventVersion {
    pub async fn find_by_event_id(
        pool: &SqlitePool,
        event_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventVersion>(
            r#"SELECT id, event_id, version, properties, changelog, created_at
               FROM event_versions
               WHERE event_id = $1
               ORDER BY version DESC"#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_event_and_version(
        pool: &SqlitePool,
        event_id: Uuid,
        version: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventVersion>(
            r#"SELECT id, event_id, version, properties, changelog, created_at
               FROM event_versions
               WHERE event_id = $1 AND version = $2"#,
        )
        .bind(event_id)
        .bind(version)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_latest<'e, E>(executor: E, event_id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, EventVersion>(
            r#"SELECT id, event_id, version, properties, changelog, created_at
               FROM event_versions
               WHERE event_id = $1
               ORDER BY version DESC
               LIMIT 1"#,
        )
        .bind(event_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        event_id: Uuid,
        version: i64,
        data: &CreateEventVersion,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, EventVersion>(
            r#"INSERT INTO event_versions (id, event_id, version, properties, changelog)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, event_id, version, properties, changelog, created_at"#,
        )
        .bind(id)
        .bind(event_id)
        .bind(version)
        .bind(Json(&data.properties))
        .bind(&data.changelog)
        .fetch_one(executor)
        .await
    }
}

impl EventVersionDiff {
    /// Compare two property lists by name; a property whose type, requiredness or
    /// description differs counts as changed.
    pub fn between(from: &EventVersion, to: &EventVersion) -> Self {
        let mut diff = EventVersionDiff {
            from_version: from.version,
            to_version: to.version,
            ..Default::default()
        };

        for prop in to.properties.iter() {
            match from.properties.iter().find(|p| p.name == prop.name) {
                None => diff.added.push(prop.name.clone()),
                Some(old) if old != prop => diff.changed.push(prop.name.clone()),
                Some(_) => {}
            }
        }
        for prop in from.properties.iter() {
            if !to.properties.iter().any(|p| p.name == prop.name) {
                diff.removed.push(prop.name.clone());
            }
        }

        diff.added.sort();
        diff.removed.sort();
        diff.changed.sort();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
