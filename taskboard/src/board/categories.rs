//! Category operations.
//!
//! Categories are per-user and never shared, so nothing here is published
//! to a project room.

use taskboard_proto::board::Category;
use taskboard_proto::id::CategoryId;

use super::Board;
use crate::category;
use crate::error::BoardError;
use crate::identity::Caller;
use crate::project;
use crate::store::{Commit, Expect, Versioned};

/// Input for [`Board::create_category`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCategory {
    /// Required; trimmed, at most 50 characters, unique per user.
    pub name: String,
    /// Required `#RRGGBB` colour.
    pub color: String,
    /// At most 200 characters.
    pub description: String,
}

impl NewCategory {
    /// A category with a name and colour.
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            description: String::new(),
        }
    }
}

/// Field changes for [`Board::update_category`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    /// New name.
    pub name: Option<String>,
    /// New colour.
    pub color: Option<String>,
    /// New description.
    pub description: Option<String>,
}

/// Ordering for [`Board::list_categories`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryOrder {
    /// Alphabetical, case-insensitive.
    #[default]
    Name,
    /// Most used first, then by name.
    Usage,
}

/// A category with the number of active tasks that carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryUsage {
    /// The category.
    pub category: Category,
    /// Non-archived tasks referencing it.
    pub tasks: usize,
}

/// Totals over the caller's categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    /// How many categories the caller has.
    pub categories: usize,
    /// Non-archived tasks carrying any of them.
    pub tasks: usize,
}

impl Board {
    /// Loads one of the caller's categories. Someone else's category is
    /// indistinguishable from a missing one.
    async fn owned_category(&self, caller: &Caller, id: CategoryId) -> Result<Versioned<Category>, BoardError> {
        self.store
            .category(id)
            .await
            .filter(|c| c.value.created_by == caller.user())
            .ok_or(BoardError::CategoryNotFound)
    }

    /// Checks a category the caller is about to put on a task.
    pub(super) async fn check_task_category(
        &self,
        caller: &Caller,
        category: Option<CategoryId>,
    ) -> Result<(), BoardError> {
        let Some(id) = category else {
            return Ok(());
        };
        match self.owned_category(caller, id).await {
            Ok(_) => Ok(()),
            Err(_) => Err(BoardError::Validation(format!("unknown category {id}"))),
        }
    }

    /// Creates a category for the caller.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] for a bad field and
    /// [`BoardError::DuplicateCategory`] if the caller already has one by
    /// that name (case-insensitive).
    pub async fn create_category(&self, caller: &Caller, input: NewCategory) -> Result<Category, BoardError> {
        let name = category::validate_category_name(&input.name).map_err(BoardError::Validation)?;
        let color = project::validate_color(&input.color).map_err(BoardError::Validation)?;
        let description =
            category::validate_category_description(&input.description).map_err(BoardError::Validation)?;

        let now = Self::now();
        let record = Category {
            id: CategoryId::new(),
            name,
            color,
            description,
            created_by: caller.user(),
            created_at: now,
            updated_at: now,
        };
        self.store
            .commit(Commit::new().put_category(Expect::Absent, record.clone()))
            .await?;

        tracing::info!(category_id = %record.id, user = %caller.user(), "category created");
        Ok(record)
    }

    /// Returns one of the caller's categories.
    ///
    /// # Errors
    ///
    /// [`BoardError::CategoryNotFound`] if it is missing or not theirs.
    pub async fn get_category(&self, caller: &Caller, id: CategoryId) -> Result<Category, BoardError> {
        Ok(self.owned_category(caller, id).await?.value)
    }

    /// Lists the caller's categories with usage counts, optionally
    /// filtered by a case-insensitive name substring.
    pub async fn list_categories(
        &self,
        caller: &Caller,
        search: Option<&str>,
        order: CategoryOrder,
    ) -> Vec<CategoryUsage> {
        let user = caller.user();
        let needle = search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
        let categories = self
            .store
            .categories_matching(|c| {
                c.created_by == user && needle.as_deref().is_none_or(|n| c.name.to_lowercase().contains(n))
            })
            .await;
        let active = self
            .store
            .tasks_matching(|t| !t.is_archived && t.category.is_some())
            .await;

        let mut out: Vec<CategoryUsage> = categories
            .into_iter()
            .map(|c| CategoryUsage {
                tasks: active
                    .iter()
                    .filter(|t| t.value.category == Some(c.value.id))
                    .count(),
                category: c.value,
            })
            .collect();
        if order == CategoryOrder::Usage {
            // Stable sort keeps the name order among equal counts.
            out.sort_by(|a, b| b.tasks.cmp(&a.tasks));
        }
        out
    }

    /// Counts the caller's categories and the active tasks using them.
    pub async fn category_stats(&self, caller: &Caller) -> CategoryStats {
        let usage = self.list_categories(caller, None, CategoryOrder::Name).await;
        CategoryStats {
            categories: usage.len(),
            tasks: usage.iter().map(|u| u.tasks).sum(),
        }
    }

    /// Changes one of the caller's categories.
    ///
    /// # Errors
    ///
    /// Not found, validation, or [`BoardError::DuplicateCategory`] on a
    /// rename onto another of the caller's names.
    pub async fn update_category(
        &self,
        caller: &Caller,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, BoardError> {
        let name = patch
            .name
            .as_deref()
            .map(category::validate_category_name)
            .transpose()
            .map_err(BoardError::Validation)?;
        let color = patch
            .color
            .as_deref()
            .map(project::validate_color)
            .transpose()
            .map_err(BoardError::Validation)?;
        let description = patch
            .description
            .as_deref()
            .map(category::validate_category_description)
            .transpose()
            .map_err(BoardError::Validation)?;

        let updated = with_retries!(self, "update_category", {
            let mut current = self.owned_category(caller, id).await?;
            let record = &mut current.value;
            if let Some(name) = &name {
                record.name.clone_from(name);
            }
            if let Some(color) = &color {
                record.color.clone_from(color);
            }
            if let Some(description) = &description {
                record.description.clone_from(description);
            }
            record.updated_at = Self::now();
            self.store
                .commit(Commit::new().put_category(Expect::Version(current.version), record.clone()))
                .await?;
            Ok(current.value)
        })?;

        tracing::debug!(category_id = %id, user = %caller.user(), "category updated");
        Ok(updated)
    }

    /// Deletes one of the caller's categories.
    ///
    /// # Errors
    ///
    /// Not found, or [`BoardError::CategoryInUse`] while any task (archived
    /// ones included) still carries it.
    pub async fn delete_category(&self, caller: &Caller, id: CategoryId) -> Result<(), BoardError> {
        with_retries!(self, "delete_category", {
            let current = self.owned_category(caller, id).await?;
            self.store
                .commit(Commit::new().delete_category(id, current.version))
                .await?;
            Ok(())
        })?;

        tracing::info!(category_id = %id, user = %caller.user(), "category deleted");
        Ok(())
    }
}
