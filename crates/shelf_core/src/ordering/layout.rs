//! Greedy column placement for grouped boards.
//!
//! Groups with an explicit in-range `column` stay there. Unplaced groups go
//! to the column with the lowest estimated height so far.

/// Number of parallel columns on the project board.
pub const COLUMN_COUNT: usize = 3;
/// Estimated height of a group header.
pub const HEADER_HEIGHT: u64 = 80;
/// Estimated height of one item row.
pub const ROW_HEIGHT: u64 = 120;

/// Group to be placed, in the order groups should appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnCandidate {
    pub name: String,
    /// Persisted column, if any.
    pub column: Option<i64>,
    pub item_count: usize,
}

/// Estimated visual height of a group with `item_count` rows.
pub fn estimated_height(item_count: usize) -> u64 {
    HEADER_HEIGHT + item_count as u64 * ROW_HEIGHT
}

/// Distributes groups into [`COLUMN_COUNT`] columns of names.
pub fn assign_columns(groups: &[ColumnCandidate]) -> Vec<Vec<String>> {
    let mut columns = vec![Vec::new(); COLUMN_COUNT];
    let mut heights = [0u64; COLUMN_COUNT];

    for group in groups {
        let target = match group.column {
            Some(column) if (0..COLUMN_COUNT as i64).contains(&column) => column as usize,
            _ => shortest_column(&heights),
        };
        columns[target].push(group.name.clone());
        heights[target] += estimated_height(group.item_count);
    }

    columns
}

fn shortest_column(heights: &[u64; COLUMN_COUNT]) -> usize {
    // First minimum wins so ties fill from the left.
    let mut best = 0;
    for (index, height) in heights.iter().enumerate() {
        if *height < heights[best] {
            best = index;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::{assign_columns, estimated_height, ColumnCandidate};

    fn candidate(name: &str, column: Option<i64>, item_count: usize) -> ColumnCandidate {
        ColumnCandidate {
            name: name.to_string(),
            column,
            item_count,
        }
    }

    #[test]
    fn unplaced_groups_fill_the_shortest_column() {
        let columns = assign_columns(&[
            candidate("big", None, 5),
            candidate("small", None, 1),
            candidate("mid", None, 2),
            candidate("next", None, 0),
        ]);
        assert_eq!(
            columns,
            vec![
                vec!["big".to_string()],
                vec!["small".to_string(), "next".to_string()],
                vec!["mid".to_string()],
            ]
        );
    }

    #[test]
    fn explicit_columns_win_and_out_of_range_falls_back() {
        let columns = assign_columns(&[
            candidate("pinned-right", Some(2), 10),
            candidate("bogus", Some(9), 1),
            candidate("left", None, 1),
        ]);
        assert_eq!(columns[2], vec!["pinned-right".to_string()]);
        assert_eq!(columns[0], vec!["bogus".to_string()]);
        assert_eq!(columns[1], vec!["left".to_string()]);
    }

    #[test]
    fn height_counts_header_and_rows() {
        assert_eq!(estimated_height(0), 80);
        assert_eq!(estimated_height(3), 80 + 360);
    }
}
