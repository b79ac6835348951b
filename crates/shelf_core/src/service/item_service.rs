//! Item use-case service.
//!
//! # Responsibility
//! - Normalize user input (titles, categories, tags) before persistence.
//! - Provide create, duplicate, trash, pin, usage and bulk-edit flows for
//!   projects and prompts.
//!
//! # Invariants
//! - New and duplicated items are appended after the largest stored order of
//!   their kind, so they never collide with existing siblings.
//! - A blank category is stored as uncategorized.
//! - Bulk edits are applied per item; one missing id does not abort the rest.
//! - Imports are all-or-nothing: one invalid record leaves the store unchanged.

use crate::model::item::{CategoryKey, Item, ItemId, ItemKind};
use crate::model::taxonomy::{normalize_name, normalize_tags};
use crate::ordering::{append_order, assign_missing_orders};
use crate::repo::item_repo::{DeletedFilter, ItemListQuery, ItemRepository};
use crate::repo::RepoError;
use crate::service::prompt_vars::fill_variables;
use log::info;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const COPY_SUFFIX: &str = " (Copy)";

/// Errors from item service operations.
#[derive(Debug)]
pub enum ItemServiceError {
    /// Title is blank after trim.
    InvalidTitle,
    /// Target item does not exist (or is in the trash when that matters).
    ItemNotFound(ItemId),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for ItemServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle => write!(f, "item title must not be blank"),
            Self::ItemNotFound(id) => write!(f, "item not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ItemServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ItemServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ItemNotFound(id) => Self::ItemNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// User input for creating one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub kind: ItemKind,
    pub title: String,
    pub body: String,
    pub category: CategoryKey,
    pub collection_id: Option<String>,
    pub tags: Vec<String>,
    pub pinned: bool,
}

impl NewItem {
    pub fn new(kind: ItemKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: String::new(),
            category: None,
            collection_id: None,
            tags: Vec::new(),
            pinned: false,
        }
    }
}

/// Changes applied to every selected item of a bulk edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkEdit {
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    /// `Some(None)` clears the category.
    pub set_category: Option<CategoryKey>,
    /// `Some(None)` removes items from their collection.
    pub set_collection: Option<Option<String>>,
    /// Moves the selection to the trash after the other edits.
    pub soft_delete: bool,
}

impl BulkEdit {
    pub fn is_empty(&self) -> bool {
        self.add_tags.is_empty()
            && self.remove_tags.is_empty()
            && self.set_category.is_none()
            && self.set_collection.is_none()
            && !self.soft_delete
    }
}

/// Result of one bulk edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub updated: usize,
    /// Selected ids that no longer exist or are already in the trash.
    pub missing: Vec<ItemId>,
}

/// Item service facade.
pub struct ItemService<R: ItemRepository> {
    repo: R,
}

impl<R: ItemRepository> ItemService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Read-only access to the backing repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Creates one item at the end of its kind.
    pub fn create_item(&self, input: NewItem) -> Result<Item, ItemServiceError> {
        let mut item = Item::new(input.kind, normalize_title(&input.title)?);
        item.body = input.body;
        item.category = normalize_category(input.category);
        item.collection_id = input.collection_id.as_deref().and_then(normalize_name);
        item.tags = normalize_tags(&input.tags);
        item.pinned = input.pinned;
        item.order = Some(append_order(self.repo.max_order(item.kind)?));
        self.repo.create_item(&item).map_err(Into::into)
    }

    /// Saves edited fields of an existing item.
    ///
    /// `order` and `usage_count` are taken from the stored item; reorders
    /// and usage go through their dedicated operations.
    pub fn update_item(&self, item: &Item) -> Result<Item, ItemServiceError> {
        let stored = self.require_item(item.id, true)?;
        let mut next = item.clone();
        next.title = normalize_title(&item.title)?;
        next.category = normalize_category(item.category.clone());
        next.collection_id = item.collection_id.as_deref().and_then(normalize_name);
        next.tags = normalize_tags(&item.tags);
        next.order = stored.order;
        next.usage_count = stored.usage_count;
        next.is_deleted = stored.is_deleted;
        next.deleted_at = stored.deleted_at;
        self.repo.update_item(&next).map_err(Into::into)
    }

    /// Loads one active item.
    pub fn get_item(&self, id: ItemId) -> Result<Option<Item>, ItemServiceError> {
        self.repo.get_item(id, false).map_err(Into::into)
    }

    /// Lists items with query options.
    pub fn list_items(&self, query: &ItemListQuery) -> Result<Vec<Item>, ItemServiceError> {
        self.repo.list_items(query).map_err(Into::into)
    }

    /// Lists trashed items of one kind.
    pub fn list_trash(&self, kind: ItemKind) -> Result<Vec<Item>, ItemServiceError> {
        self.list_items(&ItemListQuery {
            kind: Some(kind),
            category: None,
            deleted: DeletedFilter::DeletedOnly,
        })
    }

    /// Copies one item under a `"<title> (Copy)"` title at the end of its kind.
    ///
    /// The copy starts unpinned with zero usage.
    pub fn duplicate_item(&self, id: ItemId) -> Result<Item, ItemServiceError> {
        let source = self.require_item(id, false)?;
        let mut copy = Item::new(source.kind, format!("{}{COPY_SUFFIX}", source.title));
        copy.body = source.body;
        copy.category = source.category;
        copy.collection_id = source.collection_id;
        copy.tags = source.tags;
        copy.order = Some(append_order(self.repo.max_order(source.kind)?));
        self.repo.create_item(&copy).map_err(Into::into)
    }

    /// Moves one item to the trash. Trashing twice is a no-op.
    pub fn soft_delete_item(&self, id: ItemId) -> Result<(), ItemServiceError> {
        self.repo.soft_delete_item(id).map_err(Into::into)
    }

    /// Restores one item from the trash.
    pub fn restore_item(&self, id: ItemId) -> Result<(), ItemServiceError> {
        self.repo.restore_item(id).map_err(Into::into)
    }

    /// Deletes one item permanently.
    pub fn purge_item(&self, id: ItemId) -> Result<(), ItemServiceError> {
        self.repo.purge_item(id).map_err(Into::into)
    }

    /// Purges every trashed item of one kind and returns how many were removed.
    pub fn empty_trash(&self, kind: ItemKind) -> Result<usize, ItemServiceError> {
        let trashed = self.list_trash(kind)?;
        for item in &trashed {
            self.repo.purge_item(item.id)?;
        }
        info!(
            "event=trash_emptied module=service status=ok kind={} purged={}",
            kind.as_str(),
            trashed.len()
        );
        Ok(trashed.len())
    }

    /// Flips the pinned flag and returns the stored item.
    pub fn toggle_pin(&self, id: ItemId) -> Result<Item, ItemServiceError> {
        let mut item = self.require_item(id, false)?;
        item.pinned = !item.pinned;
        self.repo.update_item(&item).map_err(Into::into)
    }

    /// Records one use (e.g. a prompt copy) and returns the new count.
    pub fn record_usage(&self, id: ItemId) -> Result<i64, ItemServiceError> {
        self.repo.increment_usage(id).map_err(Into::into)
    }

    /// Fills the placeholders of one item body and records the use.
    ///
    /// Returns the ready-to-copy text.
    pub fn use_prompt(
        &self,
        id: ItemId,
        values: &HashMap<String, String>,
    ) -> Result<String, ItemServiceError> {
        let item = self.require_item(id, false)?;
        let text = fill_variables(&item.body, values);
        self.repo.increment_usage(id)?;
        Ok(text)
    }

    /// Applies `edit` to every id in `ids`.
    pub fn bulk_edit(
        &self,
        ids: &[ItemId],
        edit: &BulkEdit,
    ) -> Result<BulkOutcome, ItemServiceError> {
        let mut outcome = BulkOutcome::default();
        if edit.is_empty() {
            return Ok(outcome);
        }

        let add_tags = normalize_tags(&edit.add_tags);
        let remove_tags = normalize_tags(&edit.remove_tags);
        let set_category = edit.set_category.clone().map(normalize_category);
        let set_collection = edit
            .set_collection
            .as_ref()
            .map(|collection| collection.as_deref().and_then(normalize_name));

        for &id in ids {
            let Some(mut item) = self.repo.get_item(id, false)? else {
                outcome.missing.push(id);
                continue;
            };

            item.tags.retain(|tag| {
                !remove_tags
                    .iter()
                    .any(|removed| removed.eq_ignore_ascii_case(tag))
            });
            item.tags.extend(add_tags.iter().cloned());
            item.tags = normalize_tags(&item.tags);
            if let Some(category) = &set_category {
                item.category = category.clone();
            }
            if let Some(collection) = &set_collection {
                item.collection_id = collection.clone();
            }

            self.repo.update_item(&item)?;
            if edit.soft_delete {
                self.repo.soft_delete_item(id)?;
            }
            outcome.updated += 1;
        }

        info!(
            "event=bulk_edit module=service status=ok selected={} updated={} missing={}",
            ids.len(),
            outcome.updated,
            outcome.missing.len()
        );
        Ok(outcome)
    }

    /// Imports items, preserving their order and appending unordered ones.
    ///
    /// Returns the number of imported items.
    pub fn import_items(&self, mut items: Vec<Item>) -> Result<usize, ItemServiceError> {
        for item in &mut items {
            item.title = normalize_title(&item.title)?;
            item.category = normalize_category(item.category.take());
            item.collection_id = item.collection_id.as_deref().and_then(normalize_name);
            item.tags = normalize_tags(&item.tags);
        }

        for kind in [ItemKind::Project, ItemKind::Prompt] {
            let floor = self.repo.max_order(kind)?;
            let mut of_kind: Vec<Item> = items
                .iter()
                .filter(|item| item.kind == kind)
                .cloned()
                .collect();
            assign_missing_orders(&mut of_kind, floor);
            for assigned in of_kind {
                if let Some(slot) = items.iter_mut().find(|item| item.id == assigned.id) {
                    slot.order = assigned.order;
                }
            }
        }

        let imported = self.repo.create_items(&items)?;
        info!(
            "event=items_imported module=service status=ok count={}",
            imported
        );
        Ok(imported)
    }

    fn require_item(&self, id: ItemId, include_deleted: bool) -> Result<Item, ItemServiceError> {
        self.repo
            .get_item(id, include_deleted)?
            .ok_or(ItemServiceError::ItemNotFound(id))
    }
}

fn normalize_title(title: &str) -> Result<String, ItemServiceError> {
    normalize_name(title).ok_or(ItemServiceError::InvalidTitle)
}

fn normalize_category(category: CategoryKey) -> CategoryKey {
    category.as_deref().and_then(normalize_name)
}

#[cfg(test)]
mod tests {
    use super::{normalize_category, normalize_title, BulkEdit, ItemServiceError};

    #[test]
    fn blank_category_means_uncategorized() {
        assert_eq!(normalize_category(Some("   ".to_string())), None);
        assert_eq!(
            normalize_category(Some(" Work ".to_string())),
            Some("Work".to_string())
        );
    }

    #[test]
    fn blank_title_is_rejected() {
        assert!(matches!(
            normalize_title(" \t"),
            Err(ItemServiceError::InvalidTitle)
        ));
    }

    #[test]
    fn default_bulk_edit_is_empty() {
        assert!(BulkEdit::default().is_empty());
        let edit = BulkEdit {
            soft_delete: true,
            ..BulkEdit::default()
        };
        assert!(!edit.is_empty());
    }
}
