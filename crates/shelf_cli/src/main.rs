//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `shelf_core` linkage with a deterministic ping/version probe.
//! - Optionally print a board summary for a store file:
//!   `shelf_cli [db_path] [project|prompt]`.

use shelf_core::{
    open_db, Board, ItemFilter, ItemKind, SqliteItemRepository, SqliteTaxonomyRepository,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("shelf_core ping={}", shelf_core::ping());
    println!("shelf_core version={}", shelf_core::core_version());

    let mut args = std::env::args().skip(1);
    let Some(db_path) = args.next() else {
        return ExitCode::SUCCESS;
    };
    let kind = match args.next().as_deref() {
        None | Some("project") => ItemKind::Project,
        Some("prompt") => ItemKind::Prompt,
        Some(other) => {
            eprintln!("unknown board kind `{other}`; expected project|prompt");
            return ExitCode::FAILURE;
        }
    };

    match print_board(&db_path, kind) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn print_board(db_path: &str, kind: ItemKind) -> Result<(), String> {
    let conn = open_db(db_path).map_err(|err| format!("open `{db_path}` failed: {err}"))?;
    let items = SqliteItemRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let taxonomy = SqliteTaxonomyRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let mut board = Board::new(kind, items, taxonomy);
    board.refresh().map_err(|err| err.to_string())?;

    let state = board.state();
    println!(
        "board kind={} items={} categories={} tags={} collections={}",
        kind.as_str(),
        state.items.len(),
        state.categories.len(),
        state.tags.len(),
        state.collections.len()
    );
    for (index, column) in board.category_columns().iter().enumerate() {
        println!("column {index}: {}", column.join(", "));
    }
    for item in board.visible_items(&ItemFilter::for_kind(kind)) {
        println!(
            "{}{} [{}]",
            if item.pinned { "* " } else { "  " },
            item.title,
            item.category.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
