//! Domain model for organizer items and their taxonomy.
//!
//! # Responsibility
//! - Define canonical records for projects, prompts, tags, categories and
//!   collections.
//! - Expose the sort key every user-sortable record participates in.
//!
//! # Invariants
//! - Every record is identified by a stable id assigned at creation.
//! - `order` is a free-floating sort key, never an array index.
//! - Deletion of items is represented by soft-delete tombstones first.

pub mod item;
pub mod taxonomy;
