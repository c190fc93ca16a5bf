use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    event_category::EventCategory,
    event_version::{EventVersion, PropertyDefinition},
    platform_status::{ImplementationStatus, Platform, PlatformStatus},
};

pub const DEFAULT_PER_PAGE: i64 = 50;
pub const MAX_PER_PAGE: i64 = 200;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Draft,
    Active,
    Deprecated,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub owner_team: Option<String>,
    pub status: EventStatus,
    pub current_version: i64,
    #[ts(type = "Array<string>")]
    pub tags: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the detail page needs in one round trip
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TrackingEventDetail {
    #[serde(flatten)]
    #[ts(flatten)]
    pub event: TrackingEvent,
    pub category: Option<EventCategory>,
    pub platforms: Vec<PlatformStatus>,
    pub latest_version: Option<EventVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateTrackingEvent {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub owner_team: Option<String>,
    pub status: Option<EventStatus>,
    pub tags: Option<Vec<String>>,
    pub properties: Option<Vec<PropertyDefinition>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateTrackingEvent {
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// Missing keeps the current category, `null` detaches the event from it.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    #[ts(optional)]
    pub category_id: Option<Option<Uuid>>,
    pub owner_team: Option<String>,
    pub status: Option<EventStatus>,
    pub tags: Option<Vec<String>>,
}

/// Query-string filters for the event list
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct TrackingEventFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub status: Option<EventStatus>,
    pub platform: Option<Platform>,
    /// Only meaningful together with `platform`; defaults to `implemented`.
    pub implementation_status: Option<ImplementationStatus>,
    pub tag: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl TrackingEventFilter {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

const EVENT_COLUMNS: &str = "e.id, e.name, e.display_name, e.description, e.category_id, e.owner_team, e.status, e.current_version, e.tags, e.created_at, e.updated_at";

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filter: &'a TrackingEventFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        // Plain substring match; `%` and `_` in the term are literal.
        let term = search.to_lowercase();
        builder
            .push(" AND (instr(lower(e.name), ")
            .push_bind(term.clone())
            .push(") > 0 OR instr(lower(coalesce(e.display_name, '')), ")
            .push_bind(term.clone())
            .push(") > 0 OR instr(lower(coalesce(e.description, '')), ")
            .push_bind(term)
            .push(") > 0)");
    }
    if let Some(category_id) = filter.category_id {
        builder.push(" AND e.category_id = ").push_bind(category_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND e.status = ").push_bind(status);
    }
    if let Some(platform) = filter.platform {
        let implementation = filter
            .implementation_status
            .unwrap_or(ImplementationStatus::Implemented);
        builder
            .push(" AND EXISTS (SELECT 1 FROM event_platform_statuses p WHERE p.event_id = e.id AND p.platform = ")
            .push_bind(platform)
            .push(" AND p.implementation_status = ")
            .push_bind(implementation)
            .push(")");
    }
    if let Some(tag) = filter.tag.as_deref().filter(|t| !t.is_empty()) {
        builder
            .push(" AND EXISTS (SELECT 1 FROM json_each(e.tags) WHERE json_each.value = ")
            .push_bind(tag)
            .push(")");
    }
}

impl TrackingEvent {
    pub async fn find_filtered(
        pool: &SqlitePool,
        filter: &TrackingEventFilter,
    ) -> Result<Paginated<Self>, sqlx::Error> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tracking_events e");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {EVENT_COLUMNS} FROM tracking_events e"));
        push_filters(&mut query, filter);
        query
            .push(" ORDER BY e.name ASC LIMIT ")
            .push_bind(filter.per_page())
            .push(" OFFSET ")
            .push_bind(filter.offset());
        let items = query.build_query_as::<TrackingEvent>().fetch_all(pool).await?;

        Ok(Paginated {
            items,
            total,
            page: filter.page(),
            per_page: filter.per_page(),
        })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TrackingEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM tracking_events e WHERE e.id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TrackingEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM tracking_events e WHERE e.name = $1"
        ))
        .bind(name)
        .fetch_optional(pool)
        .await
    }

    /// Events that still matter for alerting and volume sync
    pub async fn find_not_deprecated(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TrackingEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM tracking_events e WHERE e.status != 'deprecated' ORDER BY e.name ASC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        data: &CreateTrackingEvent,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let status = data.status.unwrap_or_default();
        let tags = Json(data.tags.clone().unwrap_or_default());
        sqlx::query_as::<_, TrackingEvent>(
            r#"INSERT INTO tracking_events (id, name, display_name, description, category_id, owner_team, status, current_version, tags)
               VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8)
               RETURNING id, name, display_name, description, category_id, owner_team, status, current_version, tags, created_at, updated_at"#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.display_name)
        .bind(&data.description)
        .bind(data.category_id)
        .bind(&data.owner_team)
        .bind(status)
        .bind(tags)
        .fetch_one(executor)
        .await
    }

    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        data: &UpdateTrackingEvent,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, TrackingEvent>(
            r#"UPDATE tracking_events
               SET display_name = $2, description = $3, category_id = $4, owner_team = $5,
                   status = $6, tags = $7, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, name, display_name, description, category_id, owner_team, status, current_version, tags, created_at, updated_at"#,
        )
        .bind(id)
        .bind(&data.display_name)
        .bind(&data.description)
        .bind(data.category_id.flatten())
        .bind(&data.owner_team)
        .bind(data.status.unwrap_or_default())
        .bind(Json(data.tags.clone().unwrap_or_default()))
        .fetch_one(executor)
        .await
    }

    pub async fn set_current_version<'e, E>(
        executor: E,
        id: Uuid,
        version: i64,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE tracking_events SET current_version = $2, updated_at = datetime('now', 'subsec') WHERE id = $1",
        )
        .bind(id)
        .bind(version)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tracking_events WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DBService, models::platform_status::ValidationStatus};

    fn new_event(name: &str, tags: &[&str]) -> CreateTrackingEvent {
        CreateTrackingEvent {
            name: name.to_string(),
            display_name: None,
            description: Some(format!("{name} fired")),
            category_id: None,
            owner_team: None,
            status: None,
            tags: Some(tags.iter().map(|t| t.to_string()).collect()),
            properties: None,
        }
    }

    #[tokio::test]
    async fn test_find_filtered_by_search_tag_and_platform() {
        let db = DBService::new_in_memory().await.unwrap();
        let checkout = TrackingEvent::create(&db.pool, Uuid::new_v4(), &new_event("checkout_completed", &["commerce"]))
            .await
            .unwrap();
        TrackingEvent::create(&db.pool, Uuid::new_v4(), &new_event("screen_viewed", &["navigation"]))
            .await
            .unwrap();
        PlatformStatus::create_defaults(&db.pool, checkout.id).await.unwrap();
        PlatformStatus::update(
            &db.pool,
            checkout.id,
            Platform::Ios,
            ImplementationStatus::Implemented,
            ValidationStatus::Pending,
            Some(1),
            None,
        )
        .await
        .unwrap();

        let by_search = TrackingEvent::find_filtered(
            &db.pool,
            &TrackingEventFilter {
                search: Some("CHECKOUT".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_search.total, 1);
        assert_eq!(by_search.items[0].name, "checkout_completed");

        let by_tag = TrackingEvent::find_filtered(
            &db.pool,
            &TrackingEventFilter {
                tag: Some("navigation".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_tag.items.len(), 1);
        assert_eq!(by_tag.items[0].name, "screen_viewed");

        let implemented_on_ios = TrackingEvent::find_filtered(
            &db.pool,
            &TrackingEventFilter {
                platform: Some(Platform::Ios),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(implemented_on_ios.total, 1);
        assert_eq!(implemented_on_ios.items[0].id, checkout.id);
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let db = DBService::new_in_memory().await.unwrap();
        for name in ["pageview", "signup", "ab", "sign_up"] {
            TrackingEvent::create(&db.pool, Uuid::new_v4(), &new_event(name, &[]))
                .await
                .unwrap();
        }

        let search = |term: &str| TrackingEventFilter {
            search: Some(term.to_string()),
            ..Default::default()
        };

        let underscore = TrackingEvent::find_filtered(&db.pool, &search("_")).await.unwrap();
        assert_eq!(underscore.total, 1);
        assert_eq!(underscore.items[0].name, "sign_up");

        let gapped = TrackingEvent::find_filtered(&db.pool, &search("e_i")).await.unwrap();
        assert_eq!(gapped.total, 0);

        let percent = TrackingEvent::find_filtered(&db.pool, &search("%")).await.unwrap();
        assert_eq!(percent.total, 0);

        let substring = TrackingEvent::find_filtered(&db.pool, &search("GNU")).await.unwrap();
        let mut names: Vec<_> = substring.items.iter().map(|e| e.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["signup"]);
    }

    #[tokio::test]
    async fn test_find_filtered_paginates() {
        let db = DBService::new_in_memory().await.unwrap();
        for i in 0..5 {
            TrackingEvent::create(&db.pool, Uuid::new_v4(), &new_event(&format!("event_{i}"), &[]))
                .await
                .unwrap();
        }

        let page = TrackingEvent::find_filtered(
            &db.pool,
            &TrackingEventFilter {
                page: Some(2),
                per_page: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.page, 2);
        let names: Vec<_> = page.items.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["event_2", "event_3"]);
    }

    #[test]
    fn test_filter_clamps_paging() {
        let filter = TrackingEventFilter {
            page: Some(0),
            per_page: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.per_page(), MAX_PER_PAGE);
        assert_eq!(filter.offset(), 0);
    }
}
