//! Use-case API for the UI host.
//!
//! # Responsibility
//! - Expose board listing, item creation and drag-and-drop commands as
//!   sync FRB calls.
//! - Translate core errors and board notices into response envelopes.
//!
//! # Invariants
//! - Exported functions never panic across the FFI boundary.
//! - Every call reloads the board from the store before acting on it.

use log::warn;
use rusqlite::Connection;
use shelf_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, open_db,
    ping as ping_inner, Board, ItemFilter, ItemId, ItemKind, ItemService, NewItem,
    NoticeLevel, ReorderOutcome, SortMode, SqliteItemRepository, SqliteTaxonomyRepository,
};
use std::path::PathBuf;
use std::sync::OnceLock;

const STORE_FILE_NAME: &str = "shelf.sqlite3";
const STORE_PATH_ENV: &str = "SHELF_DB_PATH";
static STORE_PATH: OnceLock<PathBuf> = OnceLock::new();

type SqliteBoard<'conn> = Board<SqliteItemRepository<'conn>, SqliteTaxonomyRepository<'conn>>;

/// Health-check probe.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Core crate version.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes core logging once per process.
///
/// Returns an empty string on success and the error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// One card of the board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardItemView {
    pub item_id: String,
    pub title: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub usage_count: i64,
}

/// Board listing envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardResponse {
    /// Visible items after filter and sort.
    pub items: Vec<BoardItemView>,
    /// Category ids per board column.
    pub columns: Vec<Vec<String>>,
    pub message: String,
}

/// Command envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Affected item, when the command targets one.
    pub item_id: Option<String>,
    /// Human-readable message for a toast.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, item_id: Option<String>) -> Self {
        Self {
            ok: true,
            item_id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            item_id: None,
            message: message.into(),
        }
    }
}

/// Lists one board (`project|prompt`) with search text and sort mode.
///
/// `sort` accepts `custom|newest|oldest|title_asc|title_desc|popularity`;
/// unknown values fall back to `custom`.
#[flutter_rust_bridge::frb(sync)]
pub fn board_list(kind: String, search: String, sort: String) -> BoardResponse {
    let failure = |message: String| BoardResponse {
        items: Vec::new(),
        columns: Vec::new(),
        message,
    };
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(message) => return failure(message),
    };

    let result = with_board(kind, |board| {
        let mut filter = ItemFilter::for_kind(kind);
        filter.search = search;
        filter.sort = parse_sort(&sort);
        let items: Vec<BoardItemView> = board
            .visible_items(&filter)
            .into_iter()
            .map(|item| BoardItemView {
                item_id: item.id.to_string(),
                title: item.title.clone(),
                category: item.category.clone(),
                tags: item.tags.clone(),
                pinned: item.pinned,
                usage_count: item.usage_count,
            })
            .collect();
        Ok((items, board.category_columns()))
    });

    match result {
        Ok((items, columns)) => {
            let message = if items.is_empty() {
                "No items.".to_string()
            } else {
                format!("{} item(s).", items.len())
            };
            BoardResponse {
                items,
                columns,
                message,
            }
        }
        Err(message) => failure(format!("board_list failed: {message}")),
    }
}

/// Creates one item at the end of its board.
#[flutter_rust_bridge::frb(sync)]
pub fn item_create(
    kind: String,
    title: String,
    category: Option<String>,
    tags: Vec<String>,
) -> ActionResponse {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(message) => return ActionResponse::failure(message),
    };
    let result = with_store(|conn| {
        let repo = SqliteItemRepository::try_new(conn).map_err(|err| err.to_string())?;
        let service = ItemService::new(repo);
        let mut input = NewItem::new(kind, title);
        input.category = category;
        input.tags = tags;
        service.create_item(input).map_err(|err| err.to_string())
    });
    match result {
        Ok(item) => ActionResponse::success("Item created.", Some(item.id.to_string())),
        Err(err) => ActionResponse::failure(format!("item_create failed: {err}")),
    }
}

/// Reorders one item inside its category list.
#[flutter_rust_bridge::frb(sync)]
pub fn item_move(
    kind: String,
    category: Option<String>,
    old_index: u32,
    new_index: u32,
) -> ActionResponse {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(message) => return ActionResponse::failure(message),
    };
    let result = with_board(kind, |board| {
        let outcome = board
            .move_item(category.as_deref(), old_index as usize, new_index as usize)
            .map_err(|err| err.to_string())?;
        Ok(reorder_response(board, outcome, None))
    });
    result.unwrap_or_else(|err| ActionResponse::failure(format!("item_move failed: {err}")))
}

/// Drops one item into another category.
#[flutter_rust_bridge::frb(sync)]
pub fn item_move_to_category(
    kind: String,
    item_id: String,
    category: Option<String>,
    new_index: u32,
) -> ActionResponse {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(message) => return ActionResponse::failure(message),
    };
    let id = match parse_item_id(&item_id) {
        Ok(id) => id,
        Err(message) => return ActionResponse::failure(message),
    };
    let result = with_board(kind, |board| {
        let outcome = board
            .move_item_to_category(id, category, new_index as usize)
            .map_err(|err| err.to_string())?;
        Ok(reorder_response(board, outcome, Some(item_id)))
    });
    result.unwrap_or_else(|err| {
        ActionResponse::failure(format!("item_move_to_category failed: {err}"))
    })
}

/// Saves a full category column arrangement.
#[flutter_rust_bridge::frb(sync)]
pub fn category_layout_save(columns: Vec<Vec<String>>) -> ActionResponse {
    let result = with_board(ItemKind::Project, |board| {
        let outcome = board
            .apply_column_layout(&columns)
            .map_err(|err| err.to_string())?;
        Ok(reorder_response(board, outcome, None))
    });
    result.unwrap_or_else(|err| {
        ActionResponse::failure(format!("category_layout_save failed: {err}"))
    })
}

/// Records one use of a prompt (e.g. after copying it).
#[flutter_rust_bridge::frb(sync)]
pub fn item_record_usage(item_id: String) -> ActionResponse {
    let id = match parse_item_id(&item_id) {
        Ok(id) => id,
        Err(message) => return ActionResponse::failure(message),
    };
    let result = with_store(|conn| {
        let repo = SqliteItemRepository::try_new(conn).map_err(|err| err.to_string())?;
        ItemService::new(repo)
            .record_usage(id)
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(count) => ActionResponse::success(format!("Used {count} time(s)."), Some(item_id)),
        Err(err) => ActionResponse::failure(format!("item_record_usage failed: {err}")),
    }
}

fn reorder_response(
    board: &mut SqliteBoard<'_>,
    outcome: ReorderOutcome,
    item_id: Option<String>,
) -> ActionResponse {
    let notices = board.drain_notices();
    let error = notices
        .iter()
        .find(|notice| notice.level == NoticeLevel::Error);
    match outcome {
        ReorderOutcome::Unchanged => ActionResponse::success("No changes.", item_id),
        ReorderOutcome::Saved { .. } => {
            let message = notices
                .iter()
                .find(|notice| notice.level == NoticeLevel::Success)
                .map_or("Order saved.", |notice| notice.message.as_str());
            ActionResponse::success(message, item_id)
        }
        ReorderOutcome::RolledBack => ActionResponse::failure(
            error.map_or("Failed to save new order", |notice| notice.message.as_str()),
        ),
    }
}

fn parse_kind(kind: &str) -> Result<ItemKind, String> {
    ItemKind::parse(kind.trim())
        .ok_or_else(|| format!("unknown board kind `{kind}`; expected project|prompt"))
}

fn parse_sort(sort: &str) -> SortMode {
    match sort.trim() {
        "newest" => SortMode::Newest,
        "oldest" => SortMode::Oldest,
        "title_asc" => SortMode::TitleAsc,
        "title_desc" => SortMode::TitleDesc,
        "popularity" => SortMode::Popularity,
        "" | "custom" => SortMode::Custom,
        other => {
            warn!("event=ffi_sort module=ffi status=warn sort={other} fallback=custom");
            SortMode::Custom
        }
    }
}

fn parse_item_id(raw: &str) -> Result<ItemId, String> {
    ItemId::parse_str(raw.trim()).map_err(|err| format!("invalid item id `{raw}`: {err}"))
}

fn resolve_store_path() -> PathBuf {
    STORE_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(STORE_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(STORE_FILE_NAME)
        })
        .clone()
}

fn with_store<R>(
    f: impl FnOnce(&Connection) -> Result<R, String>,
) -> Result<R, String> {
    let path = resolve_store_path();
    let conn = open_db(&path).map_err(|err| format!("store open failed: {err}"))?;
    f(&conn)
}

fn with_board<R>(
    kind: ItemKind,
    f: impl FnOnce(&mut SqliteBoard<'_>) -> Result<R, String>,
) -> Result<R, String> {
    with_store(|conn| {
        let items = SqliteItemRepository::try_new(conn).map_err(|err| err.to_string())?;
        let taxonomy = SqliteTaxonomyRepository::try_new(conn).map_err(|err| err.to_string())?;
        let mut board = Board::new(kind, items, taxonomy);
        board.refresh().map_err(|err| err.to_string())?;
        f(&mut board)
    })
}
