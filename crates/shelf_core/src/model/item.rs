//! Item domain model.
//!
//! # Responsibility
//! - Define the canonical record shared by the project index and the prompt
//!   library.
//! - Provide validation and lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `id` is stable and never reused for another item.
//! - `category` is the group key; moving across groups rewrites `category`
//!   and `order` together.
//! - `deleted_at` is only set while `is_deleted` is true.

use crate::ordering::{Orderable, SortKey};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every item.
pub type ItemId = Uuid;

/// Group key of an item. `None` means uncategorized.
pub type CategoryKey = Option<String>;

/// Which organizer surface an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Entry in the project index board.
    Project,
    /// Entry in the prompt library.
    Prompt,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Prompt => "prompt",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "project" => Some(Self::Project),
            "prompt" => Some(Self::Prompt),
            _ => None,
        }
    }
}

/// Validation failures for item writes.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValidationError {
    /// Title is empty after trimming.
    BlankTitle,
    /// `order` is NaN or infinite.
    NonFiniteOrder(f64),
    /// `deleted_at` is set on an active item.
    DeletedAtWithoutTombstone,
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "item title must not be blank"),
            Self::NonFiniteOrder(value) => write!(f, "item order must be finite, got {value}"),
            Self::DeletedAtWithoutTombstone => {
                write!(f, "deleted_at requires is_deleted = true")
            }
        }
    }
}

impl Error for ItemValidationError {}

/// Canonical record for projects and prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub title: String,
    /// Project description or prompt text.
    pub body: String,
    pub category: CategoryKey,
    /// Collection slug for prompts grouped into collections.
    pub collection_id: Option<String>,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub usage_count: i64,
    /// Sort key within the item's group. `None` falls back to `created_at`.
    pub order: Option<f64>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
}

impl Item {
    /// Creates an active item with a generated id.
    ///
    /// Timestamps start at zero; repositories stamp them on insert.
    pub fn new(kind: ItemKind, title: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind, title)
    }

    /// Creates an item with a caller-provided id (imports, fixtures).
    pub fn with_id(id: ItemId, kind: ItemKind, title: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            title: title.into(),
            body: String::new(),
            category: None,
            collection_id: None,
            tags: Vec::new(),
            pinned: false,
            usage_count: 0,
            order: None,
            created_at: 0,
            updated_at: 0,
            is_deleted: false,
            deleted_at: None,
        }
    }

    /// Checks write-time invariants.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.title.trim().is_empty() {
            return Err(ItemValidationError::BlankTitle);
        }
        if let Some(order) = self.order {
            if !order.is_finite() {
                return Err(ItemValidationError::NonFiniteOrder(order));
            }
        }
        if self.deleted_at.is_some() && !self.is_deleted {
            return Err(ItemValidationError::DeletedAtWithoutTombstone);
        }
        Ok(())
    }

    /// Deterministic sort key used by every custom-ordered view.
    pub fn sort_key(&self) -> SortKey<u128> {
        SortKey::new(self.order, self.created_at, self.id.as_u128())
    }

    /// Marks the item as softly deleted.
    pub fn soft_delete(&mut self, now_ms: i64) {
        self.is_deleted = true;
        self.deleted_at = Some(now_ms);
    }

    /// Clears the tombstone.
    pub fn restore(&mut self) {
        self.is_deleted = false;
        self.deleted_at = None;
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|value| value.eq_ignore_ascii_case(tag))
    }
}

impl Orderable for Item {
    fn order(&self) -> Option<f64> {
        self.order
    }

    fn set_order(&mut self, order: f64) {
        self.order = Some(order);
    }
}
