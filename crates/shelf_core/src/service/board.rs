//! Board controller for one item kind.
//!
//! # Responsibility
//! - Cache items and taxonomy in memory and derive filtered, sorted views.
//! - Turn drop gestures into order writes: apply them optimistically, persist
//!   them in one batch, and restore the previous values when the write fails.
//! - Queue non-blocking notices for the UI.
//!
//! # Invariants
//! - A move that plans no writes issues no persistence call.
//! - After a failed write the cache holds exactly the pre-move values.
//! - A refresh snapshot is applied only if no newer refresh or mutation
//!   started after it.
//! - Category moves never compare orders across board columns.

use crate::model::item::{CategoryKey, Item, ItemId, ItemKind};
use crate::model::taxonomy::{normalize_name, taxonomy_slug, TaxonomyEntry, TaxonomyKind};
use crate::ordering::{
    assign_columns, effective_order, plan_columns, plan_drop, ColumnCandidate, DropResult,
    ReorderPlan,
};
use crate::repo::item_repo::{ItemListQuery, ItemRepository};
use crate::repo::taxonomy_repo::TaxonomyRepository;
use crate::repo::RepoError;
use log::{debug, error, info, warn};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

const UNCATEGORIZED_LABEL: &str = "Uncategorized";

/// Errors from board operations.
#[derive(Debug)]
pub enum BoardError {
    /// Drop index outside the target list.
    IndexOutOfRange { index: usize, len: usize },
    /// Item is not in the cached board state.
    UnknownItem(ItemId),
    /// Taxonomy entry is not in the cached board state.
    UnknownEntry { kind: TaxonomyKind, id: String },
    /// Categories span several columns; the flat list has no single order.
    SplitColumns,
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for BoardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexOutOfRange { index, len } => {
                write!(f, "drop index {index} out of range for list of {len}")
            }
            Self::UnknownItem(id) => write!(f, "item not on board: {id}"),
            Self::UnknownEntry { kind, id } => {
                write!(f, "{} not on board: {id}", kind.as_str())
            }
            Self::SplitColumns => write!(
                f,
                "categories span several columns; move within one column instead"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BoardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for BoardError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Severity of a user notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Short, non-blocking message for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// What a reorder did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    /// Nothing to write; no persistence call was made.
    Unchanged,
    /// Writes committed.
    Saved { updated: usize },
    /// Write failed; cached values were restored.
    RolledBack,
}

/// Cached board data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardState {
    /// Active items of the board kind, in no particular order.
    pub items: Vec<Item>,
    /// Categories in display order (column, then order).
    pub categories: Vec<TaxonomyEntry>,
    pub tags: Vec<TaxonomyEntry>,
    pub collections: Vec<TaxonomyEntry>,
}

impl BoardState {
    fn entries(&self, kind: TaxonomyKind) -> &[TaxonomyEntry] {
        match kind {
            TaxonomyKind::Tag => &self.tags,
            TaxonomyKind::Category => &self.categories,
            TaxonomyKind::Collection => &self.collections,
        }
    }

    fn entries_mut(&mut self, kind: TaxonomyKind) -> &mut Vec<TaxonomyEntry> {
        match kind {
            TaxonomyKind::Tag => &mut self.tags,
            TaxonomyKind::Category => &mut self.categories,
            TaxonomyKind::Collection => &mut self.collections,
        }
    }
}

/// Handle for one in-flight refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
}

/// How a tag filter combines several selected tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagMatch {
    /// Item carries at least one selected tag.
    #[default]
    Any,
    /// Item carries every selected tag.
    All,
}

/// Sort applied to the visible list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    /// User-defined order, ascending.
    #[default]
    Custom,
    Newest,
    Oldest,
    TitleAsc,
    TitleDesc,
    /// Most used first.
    Popularity,
}

/// Filter and sort options for [`Board::visible_items`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// Case-insensitive substring over title, body, category and tags.
    pub search: String,
    /// Category names; empty means every category.
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub tag_match: TagMatch,
    pub collection_id: Option<String>,
    pub pinned_first: bool,
    pub sort: SortMode,
}

impl ItemFilter {
    /// Default filter of each surface: projects match any tag, prompts all.
    pub fn for_kind(kind: ItemKind) -> Self {
        Self {
            tag_match: match kind {
                ItemKind::Project => TagMatch::Any,
                ItemKind::Prompt => TagMatch::All,
            },
            pinned_first: kind == ItemKind::Prompt,
            ..Self::default()
        }
    }

    fn matches(&self, item: &Item, needle: &str) -> bool {
        if !needle.is_empty() && !matches_search(item, needle) {
            return false;
        }
        if !self.categories.is_empty() {
            let item_slug = category_slug(item.category.as_deref());
            if !self
                .categories
                .iter()
                .any(|category| Some(taxonomy_slug(category)) == item_slug)
            {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let matched = match self.tag_match {
                TagMatch::Any => self.tags.iter().any(|tag| item.has_tag(tag)),
                TagMatch::All => self.tags.iter().all(|tag| item.has_tag(tag)),
            };
            if !matched {
                return false;
            }
        }
        match self.collection_id.as_deref() {
            Some(collection) => item.collection_id.as_deref() == Some(collection),
            None => true,
        }
    }

    fn compare(&self, left: &Item, right: &Item) -> Ordering {
        let pinned = if self.pinned_first {
            right.pinned.cmp(&left.pinned)
        } else {
            Ordering::Equal
        };
        let by_mode = match self.sort {
            SortMode::Custom => Ordering::Equal,
            SortMode::Newest => right.created_at.cmp(&left.created_at),
            SortMode::Oldest => left.created_at.cmp(&right.created_at),
            SortMode::TitleAsc => compare_titles(left, right),
            SortMode::TitleDesc => compare_titles(right, left),
            SortMode::Popularity => right.usage_count.cmp(&left.usage_count),
        };
        pinned
            .then(by_mode)
            .then_with(|| left.sort_key().cmp(&right.sort_key()))
    }
}

/// Root controller of one board (project index or prompt library).
pub struct Board<I: ItemRepository, T: TaxonomyRepository> {
    kind: ItemKind,
    items: I,
    taxonomy: T,
    state: BoardState,
    generation: u64,
    notices: Vec<Notice>,
}

impl<I: ItemRepository, T: TaxonomyRepository> Board<I, T> {
    /// Creates an empty board; call [`Board::refresh`] to load it.
    pub fn new(kind: ItemKind, items: I, taxonomy: T) -> Self {
        Self {
            kind,
            items,
            taxonomy,
            state: BoardState::default(),
            generation: 0,
            notices: Vec::new(),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.state.items.iter().find(|item| item.id == id)
    }

    /// Loads a fresh snapshot and applies it.
    pub fn refresh(&mut self) -> Result<(), BoardError> {
        let ticket = self.begin_refresh();
        let snapshot = self.load_snapshot()?;
        self.complete_refresh(ticket, snapshot);
        Ok(())
    }

    /// Starts a refresh. Any earlier ticket becomes stale.
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.generation += 1;
        RefreshTicket {
            generation: self.generation,
        }
    }

    /// Reads the authoritative board data from storage.
    pub fn load_snapshot(&self) -> Result<BoardState, BoardError> {
        let items = self.items.list_items(&ItemListQuery {
            kind: Some(self.kind),
            ..ItemListQuery::default()
        })?;
        Ok(BoardState {
            items,
            categories: self.taxonomy.list_entries(TaxonomyKind::Category)?,
            tags: self.taxonomy.list_entries(TaxonomyKind::Tag)?,
            collections: self.taxonomy.list_entries(TaxonomyKind::Collection)?,
        })
    }

    /// Applies `snapshot` unless `ticket` is stale. Returns whether it applied.
    pub fn complete_refresh(&mut self, ticket: RefreshTicket, snapshot: BoardState) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "event=refresh_discarded module=board status=skip ticket={} current={}",
                ticket.generation, self.generation
            );
            return false;
        }
        self.state = snapshot;
        true
    }

    /// Items of one category in display order. `None` is uncategorized.
    pub fn group_items(&self, category: Option<&str>) -> Vec<&Item> {
        let target = category_slug(category);
        let mut group: Vec<&Item> = self
            .state
            .items
            .iter()
            .filter(|item| category_slug(item.category.as_deref()) == target)
            .collect();
        group.sort_by(|left, right| left.sort_key().cmp(&right.sort_key()));
        group
    }

    /// Filtered and sorted items for display.
    pub fn visible_items(&self, filter: &ItemFilter) -> Vec<&Item> {
        let needle = filter.search.trim().to_lowercase();
        let mut visible: Vec<&Item> = self
            .state
            .items
            .iter()
            .filter(|item| filter.matches(item, &needle))
            .collect();
        visible.sort_by(|left, right| filter.compare(left, right));
        visible
    }

    /// Category ids distributed over the board columns.
    pub fn category_columns(&self) -> Vec<Vec<String>> {
        let candidates: Vec<ColumnCandidate> = self
            .state
            .categories
            .iter()
            .map(|entry| ColumnCandidate {
                name: entry.id.clone(),
                column: entry.column,
                item_count: self.group_items(Some(entry.name.as_str())).len(),
            })
            .collect();
        assign_columns(&candidates)
    }

    /// Moves one item inside its category list.
    pub fn move_item(
        &mut self,
        category: Option<&str>,
        old_index: usize,
        new_index: usize,
    ) -> Result<ReorderOutcome, BoardError> {
        let mut ids: Vec<ItemId> = self
            .group_items(category)
            .iter()
            .map(|item| item.id)
            .collect();
        move_within(&mut ids, old_index, new_index)?;
        let plan = plan_drop(
            DropResult::Flat {
                ids,
                old_index,
                new_index,
            },
            |id| self.item_order(*id),
        );
        Ok(self.commit_item_plan(plan, None))
    }

    /// Drops one item into `category` at `new_index`.
    ///
    /// The target name is trimmed; a blank name means uncategorized.
    pub fn move_item_to_category(
        &mut self,
        id: ItemId,
        category: CategoryKey,
        new_index: usize,
    ) -> Result<ReorderOutcome, BoardError> {
        let category = category.as_deref().and_then(normalize_name);
        let current = self.item(id).ok_or(BoardError::UnknownItem(id))?;
        let target = category_slug(category.as_deref());
        if category_slug(current.category.as_deref()) == target {
            let source = current.category.clone();
            let old_index = self
                .group_items(source.as_deref())
                .iter()
                .position(|item| item.id == id)
                .ok_or(BoardError::UnknownItem(id))?;
            return self.move_item(source.as_deref(), old_index, new_index);
        }

        let mut ids: Vec<ItemId> = self
            .group_items(category.as_deref())
            .iter()
            .map(|item| item.id)
            .collect();
        if new_index > ids.len() {
            return Err(BoardError::IndexOutOfRange {
                index: new_index,
                len: ids.len(),
            });
        }
        ids.insert(new_index, id);
        let label = category
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string());
        let plan = plan_drop(
            DropResult::IntoGroup {
                ids,
                new_index,
                group: category,
            },
            |id| self.item_order(*id),
        );
        Ok(self.commit_item_plan(plan, Some(label)))
    }

    /// Moves one entry inside a flat taxonomy list.
    ///
    /// Categories placed in more than one column have no flat order; use
    /// [`Board::move_category_in_column`] or [`Board::apply_column_layout`].
    pub fn move_taxonomy(
        &mut self,
        kind: TaxonomyKind,
        old_index: usize,
        new_index: usize,
    ) -> Result<ReorderOutcome, BoardError> {
        if kind == TaxonomyKind::Category {
            let mut columns = self.state.categories.iter().map(|entry| entry.column);
            if let Some(first) = columns.next() {
                if columns.any(|column| column != first) {
                    return Err(BoardError::SplitColumns);
                }
            }
        }
        let mut ids: Vec<String> = self
            .state
            .entries(kind)
            .iter()
            .map(|entry| entry.id.clone())
            .collect();
        move_within(&mut ids, old_index, new_index)?;
        let plan = plan_drop(
            DropResult::Flat {
                ids,
                old_index,
                new_index,
            },
            |id| self.entry_order(kind, id),
        );
        Ok(self.commit_taxonomy_plan(kind, plan, "Order saved"))
    }

    /// Moves one category inside a single board column. `None` is the
    /// list of categories not placed in any column yet.
    pub fn move_category_in_column(
        &mut self,
        column: Option<i64>,
        old_index: usize,
        new_index: usize,
    ) -> Result<ReorderOutcome, BoardError> {
        let mut ids: Vec<String> = self
            .state
            .categories
            .iter()
            .filter(|entry| entry.column == column)
            .map(|entry| entry.id.clone())
            .collect();
        move_within(&mut ids, old_index, new_index)?;
        let plan = plan_drop(
            DropResult::Flat {
                ids,
                old_index,
                new_index,
            },
            |id| self.entry_order(TaxonomyKind::Category, id),
        );
        Ok(self.commit_taxonomy_plan(TaxonomyKind::Category, plan, "Order saved"))
    }

    /// Persists a complete column arrangement of category ids.
    pub fn apply_column_layout(
        &mut self,
        columns: &[Vec<String>],
    ) -> Result<ReorderOutcome, BoardError> {
        for id in columns.iter().flatten() {
            if !self.state.categories.iter().any(|entry| &entry.id == id) {
                return Err(BoardError::UnknownEntry {
                    kind: TaxonomyKind::Category,
                    id: id.clone(),
                });
            }
        }
        let plan = plan_columns(columns);
        Ok(self.commit_taxonomy_plan(TaxonomyKind::Category, plan, "Updated layout"))
    }

    /// Takes every queued notice.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn item_order(&self, id: ItemId) -> Option<f64> {
        self.item(id)
            .map(|item| effective_order(item.order, item.created_at))
    }

    fn entry_order(&self, kind: TaxonomyKind, id: &str) -> Option<f64> {
        self.state
            .entries(kind)
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| effective_order(entry.order, entry.created_at))
    }

    fn commit_item_plan(
        &mut self,
        plan: ReorderPlan<ItemId, CategoryKey>,
        moved_to: Option<String>,
    ) -> ReorderOutcome {
        let updates = plan.updates();
        if updates.is_empty() {
            return ReorderOutcome::Unchanged;
        }

        let previous: Vec<(ItemId, Option<f64>, CategoryKey)> = updates
            .iter()
            .filter_map(|update| self.item(update.id))
            .map(|item| (item.id, item.order, item.category.clone()))
            .collect();
        for update in updates {
            if let Some(item) = self.item_mut(update.id) {
                item.order = Some(update.order);
                if let Some(category) = &update.group {
                    item.category = category.clone();
                }
            }
        }
        self.generation += 1;

        if let Err(err) = self.items.apply_order_updates(updates) {
            error!(
                "event=reorder_failed module=board status=error kind={} updates={} error={}",
                self.kind.as_str(),
                updates.len(),
                err
            );
            for (id, order, category) in previous {
                if let Some(item) = self.item_mut(id) {
                    item.order = order;
                    item.category = category;
                }
            }
            self.notices
                .push(Notice::new(NoticeLevel::Error, "Failed to save new order"));
            return ReorderOutcome::RolledBack;
        }

        info!(
            "event=reorder module=board status=ok kind={} updates={}",
            self.kind.as_str(),
            updates.len()
        );
        if updates.len() > 1 {
            self.notices
                .push(Notice::new(NoticeLevel::Info, "List order was renumbered"));
        }
        if let Some(label) = moved_to {
            self.reload_entries(TaxonomyKind::Category);
            self.notices
                .push(Notice::new(NoticeLevel::Success, format!("Moved to {label}")));
        }
        ReorderOutcome::Saved {
            updated: updates.len(),
        }
    }

    fn commit_taxonomy_plan(
        &mut self,
        kind: TaxonomyKind,
        plan: ReorderPlan<String, i64>,
        success_message: &str,
    ) -> ReorderOutcome {
        let updates = plan.updates();
        if updates.is_empty() {
            return ReorderOutcome::Unchanged;
        }

        let previous = self.state.entries(kind).to_vec();
        let entries = self.state.entries_mut(kind);
        for update in updates {
            if let Some(entry) = entries.iter_mut().find(|entry| entry.id == update.id) {
                entry.order = Some(update.order);
                if let Some(column) = update.group {
                    entry.column = Some(column);
                }
            }
        }
        sort_entries(entries);
        self.generation += 1;

        if let Err(err) = self.taxonomy.apply_order_updates(kind, updates) {
            error!(
                "event=reorder_failed module=board status=error kind={} updates={} error={}",
                kind.as_str(),
                updates.len(),
                err
            );
            *self.state.entries_mut(kind) = previous;
            self.notices
                .push(Notice::new(NoticeLevel::Error, "Failed to save new order"));
            return ReorderOutcome::RolledBack;
        }

        info!(
            "event=reorder module=board status=ok kind={} updates={}",
            kind.as_str(),
            updates.len()
        );
        self.notices
            .push(Notice::new(NoticeLevel::Success, success_message));
        ReorderOutcome::Saved {
            updated: updates.len(),
        }
    }

    fn reload_entries(&mut self, kind: TaxonomyKind) {
        match self.taxonomy.list_entries(kind) {
            Ok(entries) => *self.state.entries_mut(kind) = entries,
            Err(err) => warn!(
                "event=taxonomy_reload module=board status=warn kind={} error={}",
                kind.as_str(),
                err
            ),
        }
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.state.items.iter_mut().find(|item| item.id == id)
    }
}

fn move_within<Id>(
    ids: &mut Vec<Id>,
    old_index: usize,
    new_index: usize,
) -> Result<(), BoardError> {
    let len = ids.len();
    for index in [old_index, new_index] {
        if index >= len && len > 0 {
            return Err(BoardError::IndexOutOfRange { index, len });
        }
    }
    if len > 0 {
        let moved = ids.remove(old_index);
        ids.insert(new_index, moved);
    }
    Ok(())
}

fn sort_entries(entries: &mut [TaxonomyEntry]) {
    entries.sort_by(|left, right| {
        left.column
            .unwrap_or(-1)
            .cmp(&right.column.unwrap_or(-1))
            .then_with(|| left.sort_key().cmp(&right.sort_key()))
    });
}

fn category_slug(category: Option<&str>) -> Option<String> {
    category.map(taxonomy_slug).filter(|slug| !slug.is_empty())
}

fn matches_search(item: &Item, needle: &str) -> bool {
    item.title.to_lowercase().contains(needle)
        || item.body.to_lowercase().contains(needle)
        || item
            .category
            .as_deref()
            .is_some_and(|category| category.to_lowercase().contains(needle))
        || item
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

fn compare_titles(left: &Item, right: &Item) -> Ordering {
    left.title.to_lowercase().cmp(&right.title.to_lowercase())
}
