use db::models::event_category::{
    CreateEventCategory, EventCategory, EventCategoryWithCount, UpdateEventCategory,
};
use sqlx::SqlitePool;
use tracing::info;
use utils::text::non_blank;
use uuid::Uuid;

use super::event_catalog::CatalogError;

pub struct CategoryService;

impl CategoryService {
    pub async fn list(pool: &SqlitePool) -> Result<Vec<EventCategoryWithCount>, CatalogError> {
        Ok(EventCategory::find_all_with_counts(pool).await?)
    }

    pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<EventCategory, CatalogError> {
        EventCategory::find_by_id(pool, id)
            .await?
            .ok_or(CatalogError::NotFound("category"))
    }

    pub async fn create(
        pool: &SqlitePool,
        data: CreateEventCategory,
    ) -> Result<EventCategory, CatalogError> {
        let name = required_name(&data.name)?;
        Self::ensure_name_free(pool, &name, None).await?;

        let category = EventCategory::create(
            pool,
            Uuid::new_v4(),
            &CreateEventCategory {
                name,
                description: non_blank(data.description),
                color: non_blank(data.color),
            },
        )
        .await?;
        info!(category_id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        patch: UpdateEventCategory,
    ) -> Result<EventCategory, CatalogError> {
        let existing = Self::get(pool, id).await?;
        let name = match patch.name {
            Some(name) => required_name(&name)?,
            None => existing.name,
        };
        Self::ensure_name_free(pool, &name, Some(id)).await?;

        let description = non_blank(patch.description.or(existing.description));
        let color = non_blank(patch.color.or(existing.color));
        Ok(EventCategory::update(pool, id, &name, description.as_deref(), color.as_deref()).await?)
    }

    /// Events in the category are kept and become uncategorized
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<(), CatalogError> {
        if EventCategory::delete(pool, id).await? == 0 {
            return Err(CatalogError::NotFound("category"));
        }
        info!(category_id = %id, "Category deleted");
        Ok(())
    }

    async fn ensure_name_free(
        pool: &SqlitePool,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<(), CatalogError> {
        match EventCategory::find_by_name(pool, name).await? {
            Some(other) if Some(other.id) != except => Err(CatalogError::Conflict(format!(
                "category '{name}' already exists"
            ))),
            _ => Ok(()),
        }
    }
}

fn required_name(raw: &str) -> Result<String, CatalogError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CatalogError::Validation("category name is required".to_string()));
    }
    if name.chars().count() > 100 {
        return Err(CatalogError::Validation(
            "category name must be at most 100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}
