//! Item repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, soft-delete and trash APIs over the `items` table.
//! - Persist order batches, including combined `order` + `category` writes.
//! - Keep taxonomy counts exact by recounting inside each write transaction.
//!
//! # Invariants
//! - Listing is deterministic: effective order, `created_at`, `id`.
//! - A batch of order updates commits atomically; an unknown id aborts it.
//! - A bulk insert commits every item or none of them.
//! - Categories and tags referenced by an item always exist as taxonomy
//!   entries after the write that references them.

use super::taxonomy_repo::{ensure_entry, refresh_counts};
use super::{bool_to_int, ensure_schema, int_to_bool, RepoError, RepoResult};
use crate::model::item::{CategoryKey, Item, ItemId, ItemKind};
use crate::model::taxonomy::{normalize_tags, taxonomy_slug, TaxonomyKind};
use crate::ordering::OrderUpdate;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use uuid::Uuid;

/// Order write for one item; `group` carries a category change.
///
/// `group: Some(None)` moves the item to uncategorized.
pub type ItemOrderUpdate = OrderUpdate<ItemId, CategoryKey>;

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    kind,
    title,
    body,
    category,
    collection_id,
    pinned,
    usage_count,
    sort_order,
    created_at,
    updated_at,
    is_deleted,
    deleted_at
FROM items";

const ITEM_ORDER_BY_SQL: &str =
    " ORDER BY COALESCE(sort_order, created_at) ASC, created_at ASC, id ASC";

/// Tombstone visibility for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletedFilter {
    /// Active items only.
    #[default]
    ActiveOnly,
    /// Trash view.
    DeletedOnly,
    All,
}

/// Query options for listing items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemListQuery {
    pub kind: Option<ItemKind>,
    /// Exact category name match (slug comparison).
    pub category: Option<String>,
    pub deleted: DeletedFilter,
}

/// Repository interface for item operations.
pub trait ItemRepository {
    /// Inserts one item and returns the stored read model.
    fn create_item(&self, item: &Item) -> RepoResult<Item>;
    /// Inserts many items in one transaction and returns how many were written.
    fn create_items(&self, items: &[Item]) -> RepoResult<usize>;
    /// Replaces every mutable field of one item.
    fn update_item(&self, item: &Item) -> RepoResult<Item>;
    fn get_item(&self, id: ItemId, include_deleted: bool) -> RepoResult<Option<Item>>;
    fn list_items(&self, query: &ItemListQuery) -> RepoResult<Vec<Item>>;
    /// Largest stored order among active items of `kind`.
    fn max_order(&self, kind: ItemKind) -> RepoResult<Option<f64>>;
    /// Tombstones one item. Already deleted items are left unchanged.
    fn soft_delete_item(&self, id: ItemId) -> RepoResult<()>;
    /// Clears the tombstone of one item.
    fn restore_item(&self, id: ItemId) -> RepoResult<()>;
    /// Removes one item permanently.
    fn purge_item(&self, id: ItemId) -> RepoResult<()>;
    /// Bumps `usage_count` and returns the new value.
    fn increment_usage(&self, id: ItemId) -> RepoResult<i64>;
    /// Writes many order updates in one transaction.
    fn apply_order_updates(&self, updates: &[ItemOrderUpdate]) -> RepoResult<()>;
}

/// SQLite-backed item repository.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(
            conn,
            "items",
            &[
                "id",
                "kind",
                "title",
                "body",
                "category",
                "category_id",
                "collection_id",
                "pinned",
                "usage_count",
                "sort_order",
                "created_at",
                "updated_at",
                "is_deleted",
                "deleted_at",
            ],
        )?;
        ensure_schema(conn, "item_tags", &["item_id", "tag", "tag_id"])?;
        Ok(Self { conn })
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create_item(&self, item: &Item) -> RepoResult<Item> {
        item.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_item(&tx, item)?;
        let stored = load_required_item(&tx, item.id)?;
        tx.commit()?;
        Ok(stored)
    }

    fn create_items(&self, items: &[Item]) -> RepoResult<usize> {
        for item in items {
            item.validate()?;
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for item in items {
            insert_item(&tx, item)?;
        }
        tx.commit()?;
        Ok(items.len())
    }

    fn update_item(&self, item: &Item) -> RepoResult<Item> {
        item.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let previous = load_refs(&tx, item.id)?.ok_or(RepoError::ItemNotFound(item.id))?;
        let refs = resolve_refs(&tx, item)?;
        tx.execute(
            "UPDATE items
             SET kind = ?2,
                 title = ?3,
                 body = ?4,
                 category = ?5,
                 category_id = ?6,
                 collection_id = ?7,
                 pinned = ?8,
                 usage_count = ?9,
                 sort_order = ?10,
                 is_deleted = ?11,
                 deleted_at = ?12,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                item.id.to_string(),
                item.kind.as_str(),
                item.title.as_str(),
                item.body.as_str(),
                item.category.as_deref(),
                refs.category_id.as_deref(),
                refs.collection_id.as_deref(),
                bool_to_int(item.pinned),
                item.usage_count,
                item.order,
                bool_to_int(item.is_deleted),
                item.deleted_at,
            ],
        )?;
        tx.execute(
            "DELETE FROM item_tags WHERE item_id = ?1;",
            [item.id.to_string()],
        )?;
        write_tags(&tx, item.id, &refs.tags)?;
        previous.refresh(&tx)?;
        refs.refresh(&tx)?;

        let stored = load_required_item(&tx, item.id)?;
        tx.commit()?;
        Ok(stored)
    }

    fn get_item(&self, id: ItemId, include_deleted: bool) -> RepoResult<Option<Item>> {
        let item = load_item(self.conn, id)?;
        Ok(item.filter(|item| include_deleted || item.is_active()))
    }

    fn list_items(&self, query: &ItemListQuery) -> RepoResult<Vec<Item>> {
        let mut sql = format!("{ITEM_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        match query.deleted {
            DeletedFilter::ActiveOnly => sql.push_str(" AND is_deleted = 0"),
            DeletedFilter::DeletedOnly => sql.push_str(" AND is_deleted = 1"),
            DeletedFilter::All => {}
        }
        if let Some(kind) = query.kind {
            sql.push_str(" AND kind = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(category) = query.category.as_deref() {
            sql.push_str(" AND category_id = ?");
            bind_values.push(Value::Text(taxonomy_slug(category)));
        }
        sql.push_str(ITEM_ORDER_BY_SQL);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(self.conn, row)?);
        }
        Ok(items)
    }

    fn max_order(&self, kind: ItemKind) -> RepoResult<Option<f64>> {
        let max = self.conn.query_row(
            "SELECT MAX(COALESCE(sort_order, created_at))
             FROM items
             WHERE kind = ?1
               AND is_deleted = 0;",
            [kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn soft_delete_item(&self, id: ItemId) -> RepoResult<()> {
        set_tombstone(self.conn, id, true)
    }

    fn restore_item(&self, id: ItemId) -> RepoResult<()> {
        set_tombstone(self.conn, id, false)
    }

    fn purge_item(&self, id: ItemId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let refs = load_refs(&tx, id)?.ok_or(RepoError::ItemNotFound(id))?;
        tx.execute("DELETE FROM items WHERE id = ?1;", [id.to_string()])?;
        refs.refresh(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn increment_usage(&self, id: ItemId) -> RepoResult<i64> {
        let count = self
            .conn
            .query_row(
                "UPDATE items
                 SET usage_count = usage_count + 1
                 WHERE id = ?1
                   AND is_deleted = 0
                 RETURNING usage_count;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        count.ok_or(RepoError::ItemNotFound(id))
    }

    fn apply_order_updates(&self, updates: &[ItemOrderUpdate]) -> RepoResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut touched_categories: Vec<String> = Vec::new();
        for update in updates {
            let changed = match &update.group {
                None => tx.execute(
                    "UPDATE items
                     SET sort_order = ?2,
                         updated_at = (strftime('%s', 'now') * 1000)
                     WHERE id = ?1
                       AND is_deleted = 0;",
                    params![update.id.to_string(), update.order],
                )?,
                Some(category) => {
                    if let Some(previous) = load_refs(&tx, update.id)? {
                        touched_categories.extend(previous.category_id);
                    }
                    let category_id = category
                        .as_deref()
                        .map(|name| ensure_entry(&tx, TaxonomyKind::Category, name))
                        .transpose()?;
                    touched_categories.extend(category_id.clone());
                    tx.execute(
                        "UPDATE items
                         SET sort_order = ?2,
                             category = ?3,
                             category_id = ?4,
                             updated_at = (strftime('%s', 'now') * 1000)
                         WHERE id = ?1
                           AND is_deleted = 0;",
                        params![
                            update.id.to_string(),
                            update.order,
                            category.as_deref(),
                            category_id,
                        ],
                    )?
                }
            };
            if changed == 0 {
                return Err(RepoError::ItemNotFound(update.id));
            }
        }
        refresh_counts(
            &tx,
            TaxonomyKind::Category,
            touched_categories.iter().map(String::as_str),
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Taxonomy slugs an item points at.
#[derive(Debug, Default)]
struct ItemRefs {
    category_id: Option<String>,
    collection_id: Option<String>,
    /// `(name, slug)` pairs.
    tags: Vec<(String, String)>,
}

impl ItemRefs {
    fn refresh(&self, conn: &Connection) -> RepoResult<()> {
        refresh_counts(conn, TaxonomyKind::Category, self.category_id.as_deref())?;
        refresh_counts(conn, TaxonomyKind::Collection, self.collection_id.as_deref())?;
        refresh_counts(
            conn,
            TaxonomyKind::Tag,
            self.tags.iter().map(|(_, id)| id.as_str()),
        )
    }
}

fn insert_item(conn: &Connection, item: &Item) -> RepoResult<()> {
    let refs = resolve_refs(conn, item)?;
    conn.execute(
        "INSERT INTO items (
            id,
            kind,
            title,
            body,
            category,
            category_id,
            collection_id,
            pinned,
            usage_count,
            sort_order,
            created_at,
            is_deleted,
            deleted_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
            COALESCE(NULLIF(?11, 0), strftime('%s', 'now') * 1000),
            ?12, ?13
        );",
        params![
            item.id.to_string(),
            item.kind.as_str(),
            item.title.as_str(),
            item.body.as_str(),
            item.category.as_deref(),
            refs.category_id.as_deref(),
            refs.collection_id.as_deref(),
            bool_to_int(item.pinned),
            item.usage_count,
            item.order,
            item.created_at,
            bool_to_int(item.is_deleted),
            item.deleted_at,
        ],
    )?;
    write_tags(conn, item.id, &refs.tags)?;
    refs.refresh(conn)?;
    Ok(())
}

/// Creates missing category/tag entries and checks the collection exists.
fn resolve_refs(conn: &Connection, item: &Item) -> RepoResult<ItemRefs> {
    let category_id = item
        .category
        .as_deref()
        .map(|name| ensure_entry(conn, TaxonomyKind::Category, name))
        .transpose()?;

    if let Some(collection_id) = item.collection_id.as_deref() {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM taxonomy WHERE kind = 'collection' AND id = ?1
            );",
            [collection_id],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::EntryNotFound {
                kind: TaxonomyKind::Collection,
                id: collection_id.to_string(),
            });
        }
    }

    let mut tags = Vec::new();
    for name in normalize_tags(&item.tags) {
        let id = ensure_entry(conn, TaxonomyKind::Tag, &name)?;
        tags.push((name, id));
    }

    Ok(ItemRefs {
        category_id,
        collection_id: item.collection_id.clone(),
        tags,
    })
}

fn load_refs(conn: &Connection, id: ItemId) -> RepoResult<Option<ItemRefs>> {
    let head: Option<(Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT category_id, collection_id FROM items WHERE id = ?1;",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((category_id, collection_id)) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT tag, tag_id FROM item_tags WHERE item_id = ?1;")?;
    let tags = stmt
        .query_map([id.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(ItemRefs {
        category_id,
        collection_id,
        tags,
    }))
}

fn write_tags(conn: &Connection, id: ItemId, tags: &[(String, String)]) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO item_tags (item_id, tag, tag_id) VALUES (?1, ?2, ?3);",
    )?;
    for (name, tag_id) in tags {
        stmt.execute(params![id.to_string(), name, tag_id])?;
    }
    Ok(())
}

fn set_tombstone(conn: &Connection, id: ItemId, deleted: bool) -> RepoResult<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let refs = load_refs(&tx, id)?.ok_or(RepoError::ItemNotFound(id))?;
    let changed = if deleted {
        tx.execute(
            "UPDATE items
             SET is_deleted = 1,
                 deleted_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            [id.to_string()],
        )?
    } else {
        tx.execute(
            "UPDATE items
             SET is_deleted = 0,
                 deleted_at = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 1;",
            [id.to_string()],
        )?
    };
    if changed > 0 {
        refs.refresh(&tx)?;
    }
    tx.commit()?;
    Ok(())
}

fn load_item(conn: &Connection, id: ItemId) -> RepoResult<Option<Item>> {
    let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_item_row(conn, row)?));
    }
    Ok(None)
}

fn load_required_item(conn: &Connection, id: ItemId) -> RepoResult<Item> {
    load_item(conn, id)?.ok_or(RepoError::ItemNotFound(id))
}

fn load_tags(conn: &Connection, id: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT tag
         FROM item_tags
         WHERE item_id = ?1
         ORDER BY rowid ASC;",
    )?;
    let tags = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(tags)
}

fn parse_item_row(conn: &Connection, row: &Row<'_>) -> RepoResult<Item> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in items.id"))
    })?;

    let kind_text: String = row.get("kind")?;
    let kind = ItemKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid item kind `{kind_text}` in items.kind"))
    })?;

    let item = Item {
        id,
        kind,
        title: row.get("title")?,
        body: row.get("body")?,
        category: row.get("category")?,
        collection_id: row.get("collection_id")?,
        tags: load_tags(conn, &id_text)?,
        pinned: int_to_bool(row.get("pinned")?, "items.pinned")?,
        usage_count: row.get("usage_count")?,
        order: row.get("sort_order")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        is_deleted: int_to_bool(row.get("is_deleted")?, "items.is_deleted")?,
        deleted_at: row.get("deleted_at")?,
    };
    item.validate()?;
    Ok(item)
}
