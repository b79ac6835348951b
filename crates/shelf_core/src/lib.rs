//! Core domain logic for the project index and prompt library boards.
//! This crate is the single source of truth for ordering and taxonomy rules.

pub mod db;
pub mod logging;
pub mod model;
pub mod ordering;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::item::{CategoryKey, Item, ItemId, ItemKind, ItemValidationError};
pub use model::taxonomy::{TaxonomyEntry, TaxonomyKind};
pub use repo::item_repo::{
    DeletedFilter, ItemListQuery, ItemOrderUpdate, ItemRepository, SqliteItemRepository,
};
pub use repo::taxonomy_repo::{SqliteTaxonomyRepository, TaxonomyOrderUpdate, TaxonomyRepository};
pub use repo::{RepoError, RepoResult};
pub use service::board::{
    Board, BoardError, BoardState, ItemFilter, Notice, NoticeLevel, RefreshTicket,
    ReorderOutcome, SortMode, TagMatch,
};
pub use service::item_service::{BulkEdit, BulkOutcome, ItemService, ItemServiceError, NewItem};
pub use service::prompt_vars::{fill_variables, prompt_variables};
pub use service::taxonomy_service::{TaxonomyService, TaxonomyServiceError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
