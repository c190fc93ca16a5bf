//! Per-platform implementation and validation tracking.

use db::models::{
    event_change_log::{ChangeAction, EventChangeLog},
    platform_status::{
        ImplementationStatus, Platform, PlatformCoverage, PlatformStatus, UpdatePlatformStatus,
        ValidationStatus,
    },
    tracking_event::TrackingEvent,
};
use sqlx::SqlitePool;
use tracing::info;
use utils::text::non_blank;
use uuid::Uuid;

use super::event_catalog::CatalogError;

pub struct PlatformStatusService;

impl PlatformStatusService {
    pub async fn list(pool: &SqlitePool, event_id: Uuid) -> Result<Vec<PlatformStatus>, CatalogError> {
        if TrackingEvent::find_by_id(pool, event_id).await?.is_none() {
            return Err(CatalogError::NotFound("event"));
        }
        Ok(PlatformStatus::find_by_event_id(pool, event_id).await?)
    }

    /// Marking a platform implemented pins it to the event's current version;
    /// only implemented platforms can be validated.
    pub async fn update(
        pool: &SqlitePool,
        event_id: Uuid,
        platform: Platform,
        patch: UpdatePlatformStatus,
    ) -> Result<PlatformStatus, CatalogError> {
        let event = TrackingEvent::find_by_id(pool, event_id)
            .await?
            .ok_or(CatalogError::NotFound("event"))?;
        let existing = PlatformStatus::find(pool, event_id, platform)
            .await?
            .ok_or(CatalogError::NotFound("platform status"))?;

        let implementation = patch
            .implementation_status
            .unwrap_or(existing.implementation_status);
        let validation = patch.validation_status.unwrap_or(existing.validation_status);

        if validation == ValidationStatus::Valid && implementation != ImplementationStatus::Implemented {
            return Err(CatalogError::Validation(format!(
                "{platform} must be implemented before it can be marked valid"
            )));
        }

        let implemented_version = match implementation {
            ImplementationStatus::Implemented
                if existing.implementation_status != ImplementationStatus::Implemented
                    || patch.implementation_status.is_some() =>
            {
                Some(event.current_version)
            }
            ImplementationStatus::Implemented => existing.implemented_version,
            _ => None,
        };
        let notes = non_blank(patch.notes.or(existing.notes));

        let updated = PlatformStatus::update(
            pool,
            event_id,
            platform,
            implementation,
            validation,
            implemented_version,
            notes.as_deref(),
        )
        .await?;

        EventChangeLog::create(
            pool,
            event_id,
            ChangeAction::PlatformUpdated,
            Some(format!("{platform}: {implementation}, {validation}")),
        )
        .await?;
        info!(
            event_id = %event_id,
            platform = %platform,
            implementation = %implementation,
            validation = %validation,
            "Platform status updated"
        );
        Ok(updated)
    }

    pub async fn coverage(pool: &SqlitePool) -> Result<Vec<PlatformCoverage>, CatalogError> {
        Ok(PlatformStatus::coverage(pool).await?)
    }
}
