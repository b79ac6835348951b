//! Taxonomy records: tags, categories and collections.
//!
//! # Invariants
//! - `id` is the slug of `name` and is unique per kind.
//! - `count` mirrors the number of active items referencing the entry.
//! - `column` is only meaningful for categories on the project board.

use crate::ordering::{Orderable, SortKey};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static WHITESPACE_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Taxonomy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyKind {
    Tag,
    Category,
    Collection,
}

impl TaxonomyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Category => "category",
            Self::Collection => "collection",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tag" => Some(Self::Tag),
            "category" => Some(Self::Category),
            "collection" => Some(Self::Collection),
            _ => None,
        }
    }
}

/// One tag, category or collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    /// Slug derived from `name`.
    pub id: String,
    pub kind: TaxonomyKind,
    /// User-facing label, stored as entered (trimmed).
    pub name: String,
    pub count: i64,
    pub order: Option<f64>,
    /// Board column for categories. `None` lets the layout place it.
    pub column: Option<i64>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

impl TaxonomyEntry {
    pub fn sort_key(&self) -> SortKey<&str> {
        SortKey::new(self.order, self.created_at, self.name.as_str())
    }
}

impl Orderable for TaxonomyEntry {
    fn order(&self) -> Option<f64> {
        self.order
    }

    fn set_order(&mut self, order: f64) {
        self.order = Some(order);
    }
}

/// Trims a user-entered name. Returns `None` for blank input.
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trims, drops blanks and deduplicates tags case-insensitively.
///
/// The first spelling of a tag wins and input order is kept.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter_map(|tag| normalize_name(tag))
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .collect()
}

/// Derives the stable document id for a taxonomy name.
///
/// Lowercases and collapses whitespace runs into `-`.
pub fn taxonomy_slug(name: &str) -> String {
    WHITESPACE_RUN_RE
        .replace_all(name.trim(), "-")
        .to_lowercase()
}
