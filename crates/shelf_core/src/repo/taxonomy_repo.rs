//! Taxonomy repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist tags, categories and collections with their order and column.
//! - Rewrite item references for rename, merge and delete in the same
//!   transaction as the taxonomy change.
//!
//! # Invariants
//! - Entry ids are slugs of their names and unique per kind.
//! - Listing is deterministic: column, effective order, created_at, name.
//! - Renames keep `sort_order`, `column_index` and `count`.

use super::{ensure_schema, RepoError, RepoResult};
use crate::model::taxonomy::{taxonomy_slug, TaxonomyEntry, TaxonomyKind};
use crate::ordering::{append_order, OrderUpdate};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

/// Order write for one taxonomy entry; `group` is the board column.
pub type TaxonomyOrderUpdate = OrderUpdate<String, i64>;

const ENTRY_SELECT_SQL: &str = "SELECT
    kind,
    id,
    name,
    count,
    sort_order,
    column_index,
    created_at
FROM taxonomy";

/// Repository interface for taxonomy operations.
pub trait TaxonomyRepository {
    /// Lists entries of one kind in display order.
    fn list_entries(&self, kind: TaxonomyKind) -> RepoResult<Vec<TaxonomyEntry>>;
    /// Loads one entry by slug.
    fn get_entry(&self, kind: TaxonomyKind, id: &str) -> RepoResult<Option<TaxonomyEntry>>;
    /// Creates one entry at the end of its kind. Fails on slug collision.
    fn create_entry(&self, kind: TaxonomyKind, name: &str) -> RepoResult<TaxonomyEntry>;
    /// Renames one entry and every item reference to it.
    fn rename_entry(
        &self,
        kind: TaxonomyKind,
        id: &str,
        new_name: &str,
    ) -> RepoResult<TaxonomyEntry>;
    /// Moves every reference of `from_id` onto `into_id` and drops `from_id`.
    fn merge_entries(
        &self,
        kind: TaxonomyKind,
        from_id: &str,
        into_id: &str,
    ) -> RepoResult<TaxonomyEntry>;
    /// Deletes one entry and clears item references to it.
    fn delete_entry(&self, kind: TaxonomyKind, id: &str) -> RepoResult<()>;
    /// Writes order (and column, when present) for many entries atomically.
    fn apply_order_updates(
        &self,
        kind: TaxonomyKind,
        updates: &[TaxonomyOrderUpdate],
    ) -> RepoResult<()>;
    /// Recounts references for every entry of `kind`.
    ///
    /// Returns how many stored counts were wrong.
    fn recalculate_counts(&self, kind: TaxonomyKind) -> RepoResult<usize>;
}

/// SQLite-backed taxonomy repository.
pub struct SqliteTaxonomyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaxonomyRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(
            conn,
            "taxonomy",
            &[
                "kind",
                "id",
                "name",
                "count",
                "sort_order",
                "column_index",
                "created_at",
            ],
        )?;
        Ok(Self { conn })
    }
}

impl TaxonomyRepository for SqliteTaxonomyRepository<'_> {
    fn list_entries(&self, kind: TaxonomyKind) -> RepoResult<Vec<TaxonomyEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENTRY_SELECT_SQL}
             WHERE kind = ?1
             ORDER BY COALESCE(column_index, -1) ASC,
                      COALESCE(sort_order, created_at) ASC,
                      created_at ASC,
                      name ASC;"
        ))?;
        let mut rows = stmt.query([kind.as_str()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }
        Ok(entries)
    }

    fn get_entry(&self, kind: TaxonomyKind, id: &str) -> RepoResult<Option<TaxonomyEntry>> {
        load_entry(self.conn, kind, id)
    }

    fn create_entry(&self, kind: TaxonomyKind, name: &str) -> RepoResult<TaxonomyEntry> {
        let id = taxonomy_slug(name);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if load_entry(&tx, kind, &id)?.is_some() {
            return Err(RepoError::DuplicateEntry { kind, id });
        }
        insert_entry(&tx, kind, &id, name)?;
        refresh_counts(&tx, kind, [id.as_str()])?;
        let entry = load_required_entry(&tx, kind, &id)?;
        tx.commit()?;
        Ok(entry)
    }

    fn rename_entry(
        &self,
        kind: TaxonomyKind,
        id: &str,
        new_name: &str,
    ) -> RepoResult<TaxonomyEntry> {
        let new_id = taxonomy_slug(new_name);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_entry(&tx, kind, id)?;
        if new_id != id && load_entry(&tx, kind, &new_id)?.is_some() {
            return Err(RepoError::DuplicateEntry { kind, id: new_id });
        }

        let touched = rewrite_references(&tx, kind, id, Some((new_id.as_str(), new_name)))?;
        tx.execute(
            "UPDATE taxonomy
             SET id = ?3,
                 name = ?4
             WHERE kind = ?1
               AND id = ?2;",
            params![kind.as_str(), id, new_id, new_name],
        )?;
        refresh_counts(&tx, kind, [new_id.as_str()])?;
        let entry = load_required_entry(&tx, kind, &new_id)?;
        tx.commit()?;

        info!(
            "event=taxonomy_rename module=repo status=ok kind={} from={} to={} items={}",
            kind.as_str(),
            id,
            new_id,
            touched
        );
        Ok(entry)
    }

    fn merge_entries(
        &self,
        kind: TaxonomyKind,
        from_id: &str,
        into_id: &str,
    ) -> RepoResult<TaxonomyEntry> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_entry(&tx, kind, from_id)?;
        let target = load_required_entry(&tx, kind, into_id)?;
        if from_id == into_id {
            return Ok(target);
        }

        let touched = rewrite_references(
            &tx,
            kind,
            from_id,
            Some((target.id.as_str(), target.name.as_str())),
        )?;
        tx.execute(
            "DELETE FROM taxonomy WHERE kind = ?1 AND id = ?2;",
            params![kind.as_str(), from_id],
        )?;
        refresh_counts(&tx, kind, [into_id])?;
        let entry = load_required_entry(&tx, kind, into_id)?;
        tx.commit()?;

        info!(
            "event=taxonomy_merge module=repo status=ok kind={} from={} into={} items={}",
            kind.as_str(),
            from_id,
            into_id,
            touched
        );
        Ok(entry)
    }

    fn delete_entry(&self, kind: TaxonomyKind, id: &str) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_entry(&tx, kind, id)?;
        rewrite_references(&tx, kind, id, None)?;
        tx.execute(
            "DELETE FROM taxonomy WHERE kind = ?1 AND id = ?2;",
            params![kind.as_str(), id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn apply_order_updates(
        &self,
        kind: TaxonomyKind,
        updates: &[TaxonomyOrderUpdate],
    ) -> RepoResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for update in updates {
            let changed = tx.execute(
                "UPDATE taxonomy
                 SET sort_order = ?3,
                     column_index = COALESCE(?4, column_index)
                 WHERE kind = ?1
                   AND id = ?2;",
                params![kind.as_str(), update.id, update.order, update.group],
            )?;
            if changed == 0 {
                return Err(RepoError::EntryNotFound {
                    kind,
                    id: update.id.clone(),
                });
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn recalculate_counts(&self, kind: TaxonomyKind) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stale = tx.execute(
            &format!(
                "UPDATE taxonomy
                 SET count = ({count})
                 WHERE kind = ?1
                   AND count <> ({count});",
                count = count_subquery(kind)
            ),
            [kind.as_str()],
        )?;
        tx.commit()?;
        if stale > 0 {
            info!(
                "event=taxonomy_recount module=repo status=ok kind={} corrected={}",
                kind.as_str(),
                stale
            );
        }
        Ok(stale)
    }
}

/// Creates the entry for `name` when missing and returns its slug.
pub(crate) fn ensure_entry(
    conn: &Connection,
    kind: TaxonomyKind,
    name: &str,
) -> RepoResult<String> {
    let id = taxonomy_slug(name);
    if load_entry(conn, kind, &id)?.is_none() {
        insert_entry(conn, kind, &id, name)?;
    }
    Ok(id)
}

/// Recomputes `count` for the given entries; unknown ids are ignored.
pub(crate) fn refresh_counts<'a>(
    conn: &Connection,
    kind: TaxonomyKind,
    ids: impl IntoIterator<Item = &'a str>,
) -> RepoResult<()> {
    let sql = format!(
        "UPDATE taxonomy
         SET count = ({})
         WHERE kind = ?1
           AND id = ?2;",
        count_subquery(kind)
    );
    let mut stmt = conn.prepare(&sql)?;
    for id in ids {
        stmt.execute(params![kind.as_str(), id])?;
    }
    Ok(())
}

// Correlated on the outer `taxonomy.id`.
fn count_subquery(kind: TaxonomyKind) -> &'static str {
    match kind {
        TaxonomyKind::Category => {
            "SELECT COUNT(*)
             FROM items i
             WHERE i.category_id = taxonomy.id
               AND i.is_deleted = 0"
        }
        TaxonomyKind::Tag => {
            "SELECT COUNT(*)
             FROM item_tags t
             INNER JOIN items i ON i.id = t.item_id
             WHERE t.tag_id = taxonomy.id
               AND i.is_deleted = 0"
        }
        TaxonomyKind::Collection => {
            "SELECT COUNT(*)
             FROM items i
             WHERE i.collection_id = taxonomy.id
               AND i.is_deleted = 0"
        }
    }
}

fn insert_entry(conn: &Connection, kind: TaxonomyKind, id: &str, name: &str) -> RepoResult<()> {
    let max_order: Option<f64> = conn.query_row(
        "SELECT MAX(sort_order) FROM taxonomy WHERE kind = ?1;",
        [kind.as_str()],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO taxonomy (kind, id, name, count, sort_order, column_index)
         VALUES (?1, ?2, ?3, 0, ?4, NULL);",
        params![kind.as_str(), id, name, append_order(max_order)],
    )?;
    Ok(())
}

/// Points references of `id` at `target` (`(id, name)`), or clears them.
///
/// Returns the number of rows rewritten.
fn rewrite_references(
    conn: &Connection,
    kind: TaxonomyKind,
    id: &str,
    target: Option<(&str, &str)>,
) -> RepoResult<usize> {
    let touched = match (kind, target) {
        (TaxonomyKind::Category, Some((target_id, target_name))) => conn.execute(
            "UPDATE items
             SET category = ?2,
                 category_id = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE category_id = ?1;",
            params![id, target_name, target_id],
        )?,
        (TaxonomyKind::Category, None) => conn.execute(
            "UPDATE items
             SET category = NULL,
                 category_id = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE category_id = ?1;",
            [id],
        )?,
        (TaxonomyKind::Tag, Some((target_id, target_name))) => {
            let copied = conn.execute(
                "INSERT OR IGNORE INTO item_tags (item_id, tag, tag_id)
                 SELECT item_id, ?2, ?3
                 FROM item_tags
                 WHERE tag_id = ?1;",
                params![id, target_name, target_id],
            )?;
            // Renames keep the slug when only the casing changes.
            if target_id == id {
                conn.execute(
                    "UPDATE item_tags SET tag = ?2 WHERE tag_id = ?1;",
                    params![id, target_name],
                )?
            } else {
                conn.execute("DELETE FROM item_tags WHERE tag_id = ?1;", [id])?;
                copied
            }
        }
        (TaxonomyKind::Tag, None) => {
            conn.execute("DELETE FROM item_tags WHERE tag_id = ?1;", [id])?
        }
        (TaxonomyKind::Collection, Some((target_id, _))) => conn.execute(
            "UPDATE items
             SET collection_id = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE collection_id = ?1;",
            params![id, target_id],
        )?,
        (TaxonomyKind::Collection, None) => conn.execute(
            "UPDATE items
             SET collection_id = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE collection_id = ?1;",
            [id],
        )?,
    };
    Ok(touched)
}

fn load_entry(
    conn: &Connection,
    kind: TaxonomyKind,
    id: &str,
) -> RepoResult<Option<TaxonomyEntry>> {
    let mut stmt = conn.prepare(&format!(
        "{ENTRY_SELECT_SQL}
         WHERE kind = ?1
           AND id = ?2;"
    ))?;
    let entry = stmt
        .query_row(params![kind.as_str(), id], |row| Ok(parse_entry_row(row)))
        .optional()?;
    entry.transpose()
}

fn load_required_entry(
    conn: &Connection,
    kind: TaxonomyKind,
    id: &str,
) -> RepoResult<TaxonomyEntry> {
    load_entry(conn, kind, id)?.ok_or_else(|| RepoError::EntryNotFound {
        kind,
        id: id.to_string(),
    })
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<TaxonomyEntry> {
    let kind_text: String = row.get("kind")?;
    let kind = TaxonomyKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid taxonomy kind `{kind_text}` in taxonomy.kind"))
    })?;
    Ok(TaxonomyEntry {
        id: row.get("id")?,
        kind,
        name: row.get("name")?,
        count: row.get("count")?,
        order: row.get("sort_order")?,
        column: row.get("column_index")?,
        created_at: row.get("created_at")?,
    })
}
