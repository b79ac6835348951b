use rusqlite::Connection;
use shelf_core::db::open_db_in_memory;
use shelf_core::ordering::ORDER_GAP;
use shelf_core::{
    Board, BoardError, Item, ItemId, ItemKind, ItemListQuery, ItemOrderUpdate, ItemRepository,
    NoticeLevel, ReorderOutcome, RepoError, RepoResult, SqliteItemRepository,
    SqliteTaxonomyRepository, TaxonomyEntry, TaxonomyKind, TaxonomyOrderUpdate,
    TaxonomyRepository,
};
use std::cell::Cell;
use std::rc::Rc;

/// Item repository that counts batch writes and can be told to fail them.
struct RecordingItems<'conn> {
    inner: SqliteItemRepository<'conn>,
    batch_calls: Rc<Cell<usize>>,
    fail_batches: bool,
}

impl<'conn> RecordingItems<'conn> {
    fn new(conn: &'conn Connection, fail_batches: bool) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let repo = Self {
            inner: SqliteItemRepository::try_new(conn).unwrap(),
            batch_calls: Rc::clone(&calls),
            fail_batches,
        };
        (repo, calls)
    }
}

impl ItemRepository for RecordingItems<'_> {
    fn create_item(&self, item: &Item) -> RepoResult<Item> {
        self.inner.create_item(item)
    }

    fn create_items(&self, items: &[Item]) -> RepoResult<usize> {
        self.inner.create_items(items)
    }

    fn update_item(&self, item: &Item) -> RepoResult<Item> {
        self.inner.update_item(item)
    }

    fn get_item(&self, id: ItemId, include_deleted: bool) -> RepoResult<Option<Item>> {
        self.inner.get_item(id, include_deleted)
    }

    fn list_items(&self, query: &ItemListQuery) -> RepoResult<Vec<Item>> {
        self.inner.list_items(query)
    }

    fn max_order(&self, kind: ItemKind) -> RepoResult<Option<f64>> {
        self.inner.max_order(kind)
    }

    fn soft_delete_item(&self, id: ItemId) -> RepoResult<()> {
        self.inner.soft_delete_item(id)
    }

    fn restore_item(&self, id: ItemId) -> RepoResult<()> {
        self.inner.restore_item(id)
    }

    fn purge_item(&self, id: ItemId) -> RepoResult<()> {
        self.inner.purge_item(id)
    }

    fn increment_usage(&self, id: ItemId) -> RepoResult<i64> {
        self.inner.increment_usage(id)
    }

    fn apply_order_updates(&self, updates: &[ItemOrderUpdate]) -> RepoResult<()> {
        self.batch_calls.set(self.batch_calls.get() + 1);
        if self.fail_batches {
            return Err(RepoError::InvalidData("store offline".to_string()));
        }
        self.inner.apply_order_updates(updates)
    }
}

/// Taxonomy repository whose order writes always fail.
struct OfflineTaxonomy<'conn> {
    inner: SqliteTaxonomyRepository<'conn>,
}

impl TaxonomyRepository for OfflineTaxonomy<'_> {
    fn list_entries(&self, kind: TaxonomyKind) -> RepoResult<Vec<TaxonomyEntry>> {
        self.inner.list_entries(kind)
    }

    fn get_entry(&self, kind: TaxonomyKind, id: &str) -> RepoResult<Option<TaxonomyEntry>> {
        self.inner.get_entry(kind, id)
    }

    fn create_entry(&self, kind: TaxonomyKind, name: &str) -> RepoResult<TaxonomyEntry> {
        self.inner.create_entry(kind, name)
    }

    fn rename_entry(
        &self,
        kind: TaxonomyKind,
        id: &str,
        new_name: &str,
    ) -> RepoResult<TaxonomyEntry> {
        self.inner.rename_entry(kind, id, new_name)
    }

    fn merge_entries(
        &self,
        kind: TaxonomyKind,
        from_id: &str,
        into_id: &str,
    ) -> RepoResult<TaxonomyEntry> {
        self.inner.merge_entries(kind, from_id, into_id)
    }

    fn delete_entry(&self, kind: TaxonomyKind, id: &str) -> RepoResult<()> {
        self.inner.delete_entry(kind, id)
    }

    fn apply_order_updates(
        &self,
        _kind: TaxonomyKind,
        _updates: &[TaxonomyOrderUpdate],
    ) -> RepoResult<()> {
        Err(RepoError::InvalidData("store offline".to_string()))
    }

    fn recalculate_counts(&self, kind: TaxonomyKind) -> RepoResult<usize> {
        self.inner.recalculate_counts(kind)
    }
}

fn seed(conn: &Connection, title: &str, category: &str, order: f64) -> Item {
    let repo = SqliteItemRepository::try_new(conn).unwrap();
    let mut item = Item::new(ItemKind::Project, title);
    item.category = Some(category.to_string());
    item.order = Some(order);
    repo.create_item(&item).unwrap()
}

fn stored_order(conn: &Connection, id: ItemId) -> Option<f64> {
    let repo = SqliteItemRepository::try_new(conn).unwrap();
    repo.get_item(id, false).unwrap().unwrap().order
}

fn board(
    conn: &Connection,
) -> Board<SqliteItemRepository<'_>, SqliteTaxonomyRepository<'_>> {
    let mut board = Board::new(
        ItemKind::Project,
        SqliteItemRepository::try_new(conn).unwrap(),
        SqliteTaxonomyRepository::try_new(conn).unwrap(),
    );
    board.refresh().unwrap();
    board
}

fn titles(
    board: &Board<impl ItemRepository, impl TaxonomyRepository>,
    category: &str,
) -> Vec<String> {
    board
        .group_items(Some(category))
        .iter()
        .map(|item| item.title.clone())
        .collect()
}

#[test]
fn moving_to_front_goes_below_first_neighbour_only() {
    let conn = open_db_in_memory().unwrap();
    let x = seed(&conn, "X", "work", 10.0);
    let y = seed(&conn, "Y", "work", 20.0);
    let z = seed(&conn, "Z", "work", 30.0);

    let mut board = board(&conn);
    let outcome = board.move_item(Some("work"), 1, 0).unwrap();

    assert_eq!(outcome, ReorderOutcome::Saved { updated: 1 });
    assert_eq!(stored_order(&conn, y.id), Some(10.0 - ORDER_GAP));
    assert_eq!(stored_order(&conn, x.id), Some(10.0));
    assert_eq!(stored_order(&conn, z.id), Some(30.0));
    assert_eq!(titles(&board, "work"), vec!["Y", "X", "Z"]);
}

#[test]
fn repeated_insertion_between_neighbours_halves_the_gap() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, "X", "work", 10.0);
    seed(&conn, "Y", "work", 20.0);
    let w = seed(&conn, "W", "work", 20.0 + ORDER_GAP);

    let mut board = board(&conn);
    board.move_item(Some("work"), 2, 1).unwrap();
    assert_eq!(stored_order(&conn, w.id), Some(15.0));

    let v = seed(&conn, "V", "work", 20.0 + 2.0 * ORDER_GAP);
    board.refresh().unwrap();
    board.move_item(Some("work"), 3, 1).unwrap();
    assert_eq!(stored_order(&conn, v.id), Some(12.5));
    assert_eq!(titles(&board, "work"), vec!["X", "V", "W", "Y"]);
}

#[test]
fn single_sibling_and_unchanged_index_issue_no_write() {
    let conn = open_db_in_memory().unwrap();
    let only = seed(&conn, "only", "solo", 42.0);
    seed(&conn, "a", "pair", 1.0);
    seed(&conn, "b", "pair", 2.0);

    let (items, calls) = RecordingItems::new(&conn, false);
    let mut board = Board::new(
        ItemKind::Project,
        items,
        SqliteTaxonomyRepository::try_new(&conn).unwrap(),
    );
    board.refresh().unwrap();

    assert_eq!(
        board.move_item(Some("solo"), 0, 0).unwrap(),
        ReorderOutcome::Unchanged
    );
    assert_eq!(
        board.move_item(Some("pair"), 1, 1).unwrap(),
        ReorderOutcome::Unchanged
    );
    assert_eq!(calls.get(), 0);
    assert_eq!(stored_order(&conn, only.id), Some(42.0));
}

#[test]
fn moving_into_another_category_writes_group_and_order_together() {
    let conn = open_db_in_memory().unwrap();
    let moved = seed(&conn, "A", "alpha", 5.0);
    seed(&conn, "B1", "beta", 10.0);
    seed(&conn, "B2", "beta", 20.0);

    let (items, calls) = RecordingItems::new(&conn, false);
    let mut board = Board::new(
        ItemKind::Project,
        items,
        SqliteTaxonomyRepository::try_new(&conn).unwrap(),
    );
    board.refresh().unwrap();

    let outcome = board
        .move_item_to_category(moved.id, Some("beta".to_string()), 1)
        .unwrap();
    assert_eq!(outcome, ReorderOutcome::Saved { updated: 1 });
    assert_eq!(calls.get(), 1);

    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let alpha = repo
        .list_items(&ItemListQuery {
            category: Some("alpha".to_string()),
            ..ItemListQuery::default()
        })
        .unwrap();
    assert!(alpha.is_empty());
    let beta: Vec<String> = repo
        .list_items(&ItemListQuery {
            category: Some("beta".to_string()),
            ..ItemListQuery::default()
        })
        .unwrap()
        .into_iter()
        .map(|item| item.title)
        .collect();
    assert_eq!(beta, vec!["B1", "A", "B2"]);
    assert_eq!(stored_order(&conn, moved.id), Some(15.0));

    let taxonomy = SqliteTaxonomyRepository::try_new(&conn).unwrap();
    let count = |id: &str| {
        taxonomy
            .get_entry(TaxonomyKind::Category, id)
            .unwrap()
            .unwrap()
            .count
    };
    assert_eq!(count("alpha"), 0);
    assert_eq!(count("beta"), 3);

    let notices = board.drain_notices();
    assert!(notices
        .iter()
        .any(|notice| notice.level == NoticeLevel::Success && notice.message == "Moved to beta"));
    assert!(board.drain_notices().is_empty());
}

#[test]
fn dropping_into_empty_category_creates_it() {
    let conn = open_db_in_memory().unwrap();
    let moved = seed(&conn, "A", "alpha", 5.0);

    let mut board = board(&conn);
    board
        .move_item_to_category(moved.id, Some("Fresh Ideas".to_string()), 0)
        .unwrap();

    let stored = SqliteItemRepository::try_new(&conn)
        .unwrap()
        .get_item(moved.id, false)
        .unwrap()
        .unwrap();
    assert_eq!(stored.category.as_deref(), Some("Fresh Ideas"));
    assert!(board
        .state()
        .categories
        .iter()
        .any(|entry| entry.id == "fresh-ideas" && entry.count == 1));
}

#[test]
fn column_layout_persists_row_and_column_indices() {
    let conn = open_db_in_memory().unwrap();
    let taxonomy = SqliteTaxonomyRepository::try_new(&conn).unwrap();
    for name in ["a", "b", "c", "d", "e", "f"] {
        taxonomy.create_entry(TaxonomyKind::Category, name).unwrap();
    }

    let mut board = board(&conn);
    let layout = vec![
        vec!["a".to_string(), "b".to_string()],
        vec!["c".to_string()],
        vec!["d".to_string(), "e".to_string(), "f".to_string()],
    ];
    let outcome = board.apply_column_layout(&layout).unwrap();
    assert_eq!(outcome, ReorderOutcome::Saved { updated: 6 });

    for (column, ids) in layout.iter().enumerate() {
        for (row, id) in ids.iter().enumerate() {
            let entry = taxonomy
                .get_entry(TaxonomyKind::Category, id)
                .unwrap()
                .unwrap();
            assert_eq!(entry.order, Some(row as f64), "order of {id}");
            assert_eq!(entry.column, Some(column as i64), "column of {id}");
        }
    }
    assert_eq!(board.category_columns(), layout);
}

#[test]
fn failed_item_write_restores_previous_order_and_notifies() {
    let conn = open_db_in_memory().unwrap();
    let x = seed(&conn, "X", "work", 10.0);
    let y = seed(&conn, "Y", "work", 20.0);

    let (items, calls) = RecordingItems::new(&conn, true);
    let mut board = Board::new(
        ItemKind::Project,
        items,
        SqliteTaxonomyRepository::try_new(&conn).unwrap(),
    );
    board.refresh().unwrap();

    let outcome = board.move_item(Some("work"), 1, 0).unwrap();
    assert_eq!(outcome, ReorderOutcome::RolledBack);
    assert_eq!(calls.get(), 1);
    assert_eq!(board.item(y.id).unwrap().order, Some(20.0));
    assert_eq!(board.item(x.id).unwrap().order, Some(10.0));
    assert_eq!(titles(&board, "work"), vec!["X", "Y"]);
    assert_eq!(stored_order(&conn, y.id), Some(20.0));

    let notices = board.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
}

#[test]
fn failed_category_move_restores_category() {
    let conn = open_db_in_memory().unwrap();
    let moved = seed(&conn, "A", "alpha", 5.0);
    seed(&conn, "B", "beta", 10.0);

    let (items, _calls) = RecordingItems::new(&conn, true);
    let mut board = Board::new(
        ItemKind::Project,
        items,
        SqliteTaxonomyRepository::try_new(&conn).unwrap(),
    );
    board.refresh().unwrap();

    let outcome = board
        .move_item_to_category(moved.id, Some("beta".to_string()), 0)
        .unwrap();
    assert_eq!(outcome, ReorderOutcome::RolledBack);
    let cached = board.item(moved.id).unwrap();
    assert_eq!(cached.category.as_deref(), Some("alpha"));
    assert_eq!(cached.order, Some(5.0));
    assert_eq!(titles(&board, "beta"), vec!["B"]);
}

#[test]
fn failed_layout_write_restores_columns() {
    let conn = open_db_in_memory().unwrap();
    let taxonomy = SqliteTaxonomyRepository::try_new(&conn).unwrap();
    for name in ["a", "b"] {
        taxonomy.create_entry(TaxonomyKind::Category, name).unwrap();
    }

    let mut board = Board::new(
        ItemKind::Project,
        SqliteItemRepository::try_new(&conn).unwrap(),
        OfflineTaxonomy {
            inner: SqliteTaxonomyRepository::try_new(&conn).unwrap(),
        },
    );
    board.refresh().unwrap();
    let before = board.state().categories.clone();

    let outcome = board
        .apply_column_layout(&[vec!["b".to_string()], vec!["a".to_string()]])
        .unwrap();
    assert_eq!(outcome, ReorderOutcome::RolledBack);
    assert_eq!(board.state().categories, before);
    assert_eq!(board.drain_notices()[0].level, NoticeLevel::Error);
}

#[test]
fn stale_refresh_is_discarded() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, "first", "work", 1.0);
    let mut board = board(&conn);

    let slow = board.begin_refresh();
    let slow_snapshot = board.load_snapshot().unwrap();
    seed(&conn, "second", "work", 2.0);
    let fast = board.begin_refresh();
    let fast_snapshot = board.load_snapshot().unwrap();

    assert!(board.complete_refresh(fast, fast_snapshot));
    assert!(!board.complete_refresh(slow, slow_snapshot));
    assert_eq!(titles(&board, "work"), vec!["first", "second"]);
}

#[test]
fn refresh_started_before_a_move_cannot_undo_it() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, "X", "work", 10.0);
    let y = seed(&conn, "Y", "work", 20.0);
    let mut board = board(&conn);

    let ticket = board.begin_refresh();
    let snapshot = board.load_snapshot().unwrap();
    board.move_item(Some("work"), 1, 0).unwrap();

    assert!(!board.complete_refresh(ticket, snapshot));
    assert_eq!(board.item(y.id).unwrap().order, Some(10.0 - ORDER_GAP));
}

#[test]
fn out_of_range_drop_is_an_error() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, "X", "work", 10.0);
    seed(&conn, "Y", "work", 20.0);
    let mut board = board(&conn);

    assert!(board.move_item(Some("work"), 0, 5).is_err());
    assert!(board
        .move_item_to_category(ItemId::new_v4(), None, 0)
        .is_err());
}

#[test]
fn taxonomy_flat_move_uses_midpoint() {
    let conn = open_db_in_memory().unwrap();
    let taxonomy = SqliteTaxonomyRepository::try_new(&conn).unwrap();
    for name in ["one", "two", "three"] {
        taxonomy.create_entry(TaxonomyKind::Tag, name).unwrap();
    }

    let mut board = board(&conn);
    board.move_taxonomy(TaxonomyKind::Tag, 2, 0).unwrap();

    let ids: Vec<String> = taxonomy
        .list_entries(TaxonomyKind::Tag)
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    assert_eq!(ids, vec!["three", "one", "two"]);
    let three = taxonomy.get_entry(TaxonomyKind::Tag, "three").unwrap().unwrap();
    assert_eq!(three.order, Some(-ORDER_GAP));
}

fn category_ids(conn: &Connection) -> Vec<String> {
    SqliteTaxonomyRepository::try_new(conn)
        .unwrap()
        .list_entries(TaxonomyKind::Category)
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect()
}

#[test]
fn flat_category_move_across_columns_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let taxonomy = SqliteTaxonomyRepository::try_new(&conn).unwrap();
    for name in ["a", "b", "c"] {
        taxonomy.create_entry(TaxonomyKind::Category, name).unwrap();
    }
    let mut board = board(&conn);
    board
        .apply_column_layout(&[
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
        ])
        .unwrap();

    assert!(matches!(
        board.move_taxonomy(TaxonomyKind::Category, 0, 2),
        Err(BoardError::SplitColumns)
    ));
    assert_eq!(category_ids(&conn), vec!["a", "b", "c"]);

    let outcome = board.move_category_in_column(Some(0), 0, 1).unwrap();
    assert_eq!(outcome, ReorderOutcome::Saved { updated: 1 });
    assert_eq!(category_ids(&conn), vec!["b", "a", "c"]);
    let moved = taxonomy
        .get_entry(TaxonomyKind::Category, "a")
        .unwrap()
        .unwrap();
    assert_eq!(moved.column, Some(0));
    assert_eq!(moved.order, Some(1.0 + ORDER_GAP));
    assert_eq!(
        board.category_columns(),
        vec![
            vec!["b".to_string(), "a".to_string()],
            vec!["c".to_string()],
            Vec::new(),
        ]
    );
}

#[test]
fn flat_category_move_works_while_no_column_is_assigned() {
    let conn = open_db_in_memory().unwrap();
    let taxonomy = SqliteTaxonomyRepository::try_new(&conn).unwrap();
    for name in ["a", "b", "c"] {
        taxonomy.create_entry(TaxonomyKind::Category, name).unwrap();
    }
    let mut board = board(&conn);

    board.move_taxonomy(TaxonomyKind::Category, 0, 2).unwrap();
    assert_eq!(category_ids(&conn), vec!["b", "c", "a"]);
}

#[test]
fn blank_target_category_means_uncategorized() {
    let conn = open_db_in_memory().unwrap();
    let moved = seed(&conn, "A", "work", 5.0);
    let mut board = board(&conn);

    board
        .move_item_to_category(moved.id, Some("   ".to_string()), 0)
        .unwrap();

    let stored = SqliteItemRepository::try_new(&conn)
        .unwrap()
        .get_item(moved.id, false)
        .unwrap()
        .unwrap();
    assert_eq!(stored.category, None);
    assert_eq!(category_ids(&conn), vec!["work"]);
    assert!(board
        .state()
        .categories
        .iter()
        .all(|entry| !entry.id.is_empty()));
    assert!(board
        .drain_notices()
        .iter()
        .any(|notice| notice.message == "Moved to Uncategorized"));
}

#[test]
fn target_category_name_is_trimmed() {
    let conn = open_db_in_memory().unwrap();
    let moved = seed(&conn, "A", "alpha", 5.0);
    seed(&conn, "B", "Work", 10.0);
    let mut board = board(&conn);

    board
        .move_item_to_category(moved.id, Some("  Work  ".to_string()), 1)
        .unwrap();

    let stored = SqliteItemRepository::try_new(&conn)
        .unwrap()
        .get_item(moved.id, false)
        .unwrap()
        .unwrap();
    assert_eq!(stored.category.as_deref(), Some("Work"));
    let work = SqliteTaxonomyRepository::try_new(&conn)
        .unwrap()
        .get_entry(TaxonomyKind::Category, "work")
        .unwrap()
        .unwrap();
    assert_eq!(work.name, "Work");
    assert_eq!(work.count, 2);
    assert_eq!(titles(&board, "Work"), vec!["B", "A"]);
}

#[test]
fn exhausted_gap_renumbers_the_whole_list() {
    let conn = open_db_in_memory().unwrap();
    let x = seed(&conn, "X", "work", 1.0);
    let y = seed(&conn, "Y", "work", 1.0 + 1e-9);
    let z = seed(&conn, "Z", "work", 5.0);

    let (items, calls) = RecordingItems::new(&conn, false);
    let mut board = Board::new(
        ItemKind::Project,
        items,
        SqliteTaxonomyRepository::try_new(&conn).unwrap(),
    );
    board.refresh().unwrap();

    let outcome = board.move_item(Some("work"), 2, 1).unwrap();
    assert_eq!(outcome, ReorderOutcome::Saved { updated: 3 });
    assert_eq!(calls.get(), 1);
    assert_eq!(stored_order(&conn, x.id), Some(0.0));
    assert_eq!(stored_order(&conn, z.id), Some(ORDER_GAP));
    assert_eq!(stored_order(&conn, y.id), Some(2.0 * ORDER_GAP));
    assert_eq!(titles(&board, "work"), vec!["X", "Z", "Y"]);

    let notices = board.drain_notices();
    assert!(notices.iter().any(|notice| notice.level == NoticeLevel::Info
        && notice.message == "List order was renumbered"));
}

#[test]
fn exhausted_gap_in_target_category_renumbers_and_moves() {
    let conn = open_db_in_memory().unwrap();
    let moved = seed(&conn, "M", "alpha", 7.0);
    let x = seed(&conn, "X", "beta", 1.0);
    let y = seed(&conn, "Y", "beta", 1.0 + 1e-9);
    let mut board = board(&conn);

    let outcome = board
        .move_item_to_category(moved.id, Some("beta".to_string()), 1)
        .unwrap();
    assert_eq!(outcome, ReorderOutcome::Saved { updated: 3 });

    let stored = SqliteItemRepository::try_new(&conn)
        .unwrap()
        .get_item(moved.id, false)
        .unwrap()
        .unwrap();
    assert_eq!(stored.category.as_deref(), Some("beta"));
    assert_eq!(stored.order, Some(ORDER_GAP));
    assert_eq!(stored_order(&conn, x.id), Some(0.0));
    assert_eq!(stored_order(&conn, y.id), Some(2.0 * ORDER_GAP));
    assert_eq!(titles(&board, "beta"), vec!["X", "M", "Y"]);
    assert!(titles(&board, "alpha").is_empty());

    let levels: Vec<NoticeLevel> = board
        .drain_notices()
        .into_iter()
        .map(|notice| notice.level)
        .collect();
    assert_eq!(levels, vec![NoticeLevel::Info, NoticeLevel::Success]);
}
