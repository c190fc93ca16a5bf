//! Tracking-event definitions, their versions and change history.

use db::models::{
    event_category::EventCategory,
    event_change_log::{ChangeAction, EventChangeLog, EventChangeLogWithEvent},
    event_version::{CreateEventVersion, EventVersion, EventVersionDiff, PropertyDefinition},
    platform_status::PlatformStatus,
    tracking_event::{
        CreateTrackingEvent, EventStatus, Paginated, TrackingEvent, TrackingEventDetail,
        TrackingEventFilter, UpdateTrackingEvent,
    },
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use utils::text::{is_snake_case_identifier, non_blank};
use uuid::Uuid;

pub const MAX_EVENT_NAME_LEN: usize = 100;
pub const MAX_PROPERTIES: usize = 200;
pub const MAX_TAGS: usize = 20;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        let unique_violation = e
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation());
        if unique_violation {
            CatalogError::Conflict(e.to_string())
        } else {
            CatalogError::Database(e)
        }
    }
}

/// Event names are lowercase snake_case, 2 to 100 characters
pub fn validate_event_name(name: &str) -> Result<(), CatalogError> {
    if name.len() < 2 || name.len() > MAX_EVENT_NAME_LEN || !is_snake_case_identifier(name) {
        return Err(CatalogError::Validation(format!(
            "event name '{name}' must be snake_case, start with a letter and be 2-{MAX_EVENT_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_properties(properties: &[PropertyDefinition]) -> Result<(), CatalogError> {
    if properties.len() > MAX_PROPERTIES {
        return Err(CatalogError::Validation(format!(
            "an event version may declare at most {MAX_PROPERTIES} properties"
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for prop in properties {
        if !is_snake_case_identifier(&prop.name) {
            return Err(CatalogError::Validation(format!(
                "property name '{}' must be snake_case",
                prop.name
            )));
        }
        if !seen.insert(prop.name.as_str()) {
            return Err(CatalogError::Validation(format!(
                "property '{}' is declared more than once",
                prop.name
            )));
        }
    }
    Ok(())
}

fn normalize_tags(tags: Option<Vec<String>>) -> Result<Option<Vec<String>>, CatalogError> {
    let Some(tags) = tags else {
        return Ok(None);
    };
    let mut normalized: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    if normalized.len() > MAX_TAGS {
        return Err(CatalogError::Validation(format!(
            "an event may carry at most {MAX_TAGS} tags"
        )));
    }
    Ok(Some(normalized))
}

async fn ensure_category_exists(
    pool: &SqlitePool,
    category_id: Option<Uuid>,
) -> Result<(), CatalogError> {
    if let Some(id) = category_id {
        if EventCategory::find_by_id(pool, id).await?.is_none() {
            return Err(CatalogError::Validation(format!("category {id} does not exist")));
        }
    }
    Ok(())
}

pub struct EventCatalogService;

impl EventCatalogService {
    pub async fn list(
        pool: &SqlitePool,
        filter: &TrackingEventFilter,
    ) -> Result<Paginated<TrackingEvent>, CatalogError> {
        Ok(TrackingEvent::find_filtered(pool, filter).await?)
    }

    pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<TrackingEvent, CatalogError> {
        TrackingEvent::find_by_id(pool, id)
            .await?
            .ok_or(CatalogError::NotFound("event"))
    }

    pub async fn get_detail(pool: &SqlitePool, id: Uuid) -> Result<TrackingEventDetail, CatalogError> {
        let event = Self::get(pool, id).await?;
        let category = match event.category_id {
            Some(category_id) => EventCategory::find_by_id(pool, category_id).await?,
            None => None,
        };
        let platforms = PlatformStatus::find_by_event_id(pool, id).await?;
        let latest_version = EventVersion::find_latest(pool, id).await?;

        Ok(TrackingEventDetail {
            event,
            category,
            platforms,
            latest_version,
        })
    }

    /// Creates the event together with version 1 and a status row per platform
    pub async fn create(
        pool: &SqlitePool,
        data: CreateTrackingEvent,
    ) -> Result<TrackingEventDetail, CatalogError> {
        let name = data.name.trim().to_string();
        validate_event_name(&name)?;
        let properties = data.properties.clone().unwrap_or_default();
        validate_properties(&properties)?;
        ensure_category_exists(pool, data.category_id).await?;
        if data.status == Some(EventStatus::Deprecated) {
            return Err(CatalogError::Validation(
                "a new event cannot start out deprecated".to_string(),
            ));
        }
        if TrackingEvent::find_by_name(pool, &name).await?.is_some() {
            return Err(CatalogError::Conflict(format!("event '{name}' already exists")));
        }

        let data = CreateTrackingEvent {
            name,
            display_name: non_blank(data.display_name),
            description: non_blank(data.description),
            owner_team: non_blank(data.owner_team),
            tags: normalize_tags(data.tags)?,
            ..data
        };

        let id = Uuid::new_v4();
        let mut tx = pool.begin().await?;
        let event = TrackingEvent::create(&mut *tx, id, &data).await?;
        EventVersion::create(
            &mut *tx,
            id,
            1,
            &CreateEventVersion {
                properties,
                changelog: Some("Initial version".to_string()),
            },
        )
        .await?;
        PlatformStatus::create_defaults(&mut *tx, id).await?;
        EventChangeLog::create(&mut *tx, id, ChangeAction::Created, None).await?;
        tx.commit().await?;

        info!(event_id = %id, name = %event.name, "Tracking event created");
        Self::get_detail(pool, id).await
    }

    /// Fields left out of the patch keep their current value; an empty string
    /// clears a text field.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        patch: UpdateTrackingEvent,
    ) -> Result<TrackingEvent, CatalogError> {
        let existing = Self::get(pool, id).await?;
        let category_id = match patch.category_id {
            Some(explicit) => explicit,
            None => existing.category_id,
        };
        ensure_category_exists(pool, category_id).await?;

        let status = patch.status.unwrap_or(existing.status);
        if existing.status == EventStatus::Deprecated && status != EventStatus::Deprecated {
            return Err(CatalogError::Validation(
                "deprecated events cannot be reactivated".to_string(),
            ));
        }

        let merged = UpdateTrackingEvent {
            display_name: non_blank(patch.display_name.or_else(|| existing.display_name.clone())),
            description: non_blank(patch.description.or_else(|| existing.description.clone())),
            category_id: Some(category_id),
            owner_team: non_blank(patch.owner_team.or_else(|| existing.owner_team.clone())),
            status: Some(status),
            tags: normalize_tags(patch.tags)?.or_else(|| Some(existing.tags.0.clone())),
        };

        let changed = changed_fields(&existing, &merged);
        let action = if status == EventStatus::Deprecated && existing.status != EventStatus::Deprecated {
            ChangeAction::Deprecated
        } else {
            ChangeAction::Updated
        };

        let mut tx = pool.begin().await?;
        let event = TrackingEvent::update(&mut *tx, id, &merged).await?;
        if !changed.is_empty() {
            EventChangeLog::create(&mut *tx, id, action, Some(changed.join(", "))).await?;
        }
        tx.commit().await?;
        Ok(event)
    }

    pub async fn deprecate(pool: &SqlitePool, id: Uuid) -> Result<TrackingEvent, CatalogError> {
        Self::update(
            pool,
            id,
            UpdateTrackingEvent {
                status: Some(EventStatus::Deprecated),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<(), CatalogError> {
        if TrackingEvent::delete(pool, id).await? == 0 {
            return Err(CatalogError::NotFound("event"));
        }
        info!(event_id = %id, "Tracking event deleted");
        Ok(())
    }

    pub async fn list_versions(pool: &SqlitePool, event_id: Uuid) -> Result<Vec<EventVersion>, CatalogError> {
        Self::get(pool, event_id).await?;
        Ok(EventVersion::find_by_event_id(pool, event_id).await?)
    }

    pub async fn get_version(
        pool: &SqlitePool,
        event_id: Uuid,
        version: i64,
    ) -> Result<EventVersion, CatalogError> {
        EventVersion::find_by_event_and_version(pool, event_id, version)
            .await?
            .ok_or(CatalogError::NotFound("event version"))
    }

    /// Appends `current_version + 1`. A schema change sends every platform back
    /// through implementation and validation.
    pub async fn create_version(
        pool: &SqlitePool,
        event_id: Uuid,
        data: CreateEventVersion,
    ) -> Result<EventVersion, CatalogError> {
        let event = Self::get(pool, event_id).await?;
        if event.status == EventStatus::Deprecated {
            return Err(CatalogError::Validation(
                "deprecated events cannot receive new versions".to_string(),
            ));
        }
        validate_properties(&data.properties)?;
        let data = CreateEventVersion {
            changelog: non_blank(data.changelog),
            ..data
        };

        let mut tx = pool.begin().await?;
        let previous = EventVersion::find_latest(&mut *tx, event_id).await?;
        let next = previous.as_ref().map(|v| v.version + 1).unwrap_or(1);
        let version = EventVersion::create(&mut *tx, event_id, next, &data).await?;
        TrackingEvent::set_current_version(&mut *tx, event_id, next).await?;

        let schema_changed = previous
            .as_ref()
            .is_none_or(|prev| !EventVersionDiff::between(prev, &version).is_empty());
        if schema_changed {
            PlatformStatus::reset_for_new_version(&mut *tx, event_id).await?;
        }
        EventChangeLog::create(
            &mut *tx,
            event_id,
            ChangeAction::VersionAdded,
            Some(format!("v{next}")),
        )
        .await?;
        tx.commit().await?;

        info!(event_id = %event_id, version = next, schema_changed, "Event version added");
        Ok(version)
    }

    pub async fn diff_versions(
        pool: &SqlitePool,
        event_id: Uuid,
        from: i64,
        to: i64,
    ) -> Result<EventVersionDiff, CatalogError> {
        let from_version = Self::get_version(pool, event_id, from).await?;
        let to_version = Self::get_version(pool, event_id, to).await?;
        Ok(EventVersionDiff::between(&from_version, &to_version))
    }

    pub async fn list_changes(
        pool: &SqlitePool,
        event_id: Uuid,
        limit: i64,
    ) -> Result<Vec<EventChangeLog>, CatalogError> {
        Self::get(pool, event_id).await?;
        Ok(EventChangeLog::find_by_event_id(pool, event_id, limit.clamp(1, 500)).await?)
    }

    pub async fn recent_changes(
        pool: &SqlitePool,
        limit: i64,
    ) -> Result<Vec<EventChangeLogWithEvent>, CatalogError> {
        Ok(EventChangeLog::find_recent(pool, limit.clamp(1, 500)).await?)
    }
}

fn changed_fields(existing: &TrackingEvent, merged: &UpdateTrackingEvent) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if existing.display_name != merged.display_name {
        changed.push("display_name");
    }
    if existing.description != merged.description {
        changed.push("description");
    }
    if Some(existing.category_id) != merged.category_id {
        changed.push("category");
    }
    if existing.owner_team != merged.owner_team {
        changed.push("owner_team");
    }
    if Some(existing.status) != merged.status {
        changed.push("status");
    }
    if Some(&existing.tags.0) != merged.tags.as_ref() {
        changed.push("tags");
    }
    changed
}
