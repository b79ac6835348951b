//! Fractional order keys for user-sortable lists.
//!
//! # Responsibility
//! - Compute a new `order` for one moved entity from its new neighbours.
//! - Detect precision exhaustion and produce evenly spaced replacements.
//! - Provide the deterministic comparison every custom-ordered view uses.
//!
//! # Invariants
//! - A single move never rewrites a sibling's order, unless the gap between
//!   the new neighbours is exhausted and the whole list is rebalanced.
//! - Entities without an order compare by their creation timestamp.
//! - Equal orders are broken by creation time, then by a stable tie key.

use std::cmp::Ordering;

pub mod layout;
pub mod plan;

pub use layout::{assign_columns, estimated_height, ColumnCandidate, COLUMN_COUNT};
pub use plan::{plan_columns, plan_drop, DropResult, OrderUpdate, ReorderPlan};

/// Distance used when moving to either end of a list.
pub const ORDER_GAP: f64 = 100_000.0;

/// Smallest neighbour gap accepted before a list is rebalanced.
pub const REBALANCE_EPSILON: f64 = 1e-6;

/// Entity with a mutable fractional order.
pub trait Orderable {
    fn order(&self) -> Option<f64>;
    fn set_order(&mut self, order: f64);
}

/// Total, deterministic sort key.
#[derive(Debug, Clone, Copy)]
pub struct SortKey<T> {
    pub order: f64,
    pub created_at: i64,
    pub tie: T,
}

impl<T> SortKey<T> {
    /// Builds a key, falling back to `created_at` when no order is set.
    pub fn new(order: Option<f64>, created_at: i64, tie: T) -> Self {
        Self {
            order: effective_order(order, created_at),
            created_at,
            tie,
        }
    }
}

impl<T: Ord> PartialEq for SortKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for SortKey<T> {}

impl<T: Ord> PartialOrd for SortKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for SortKey<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .total_cmp(&other.order)
            .then(self.created_at.cmp(&other.created_at))
            .then_with(|| self.tie.cmp(&other.tie))
    }
}

/// Order value used for comparison: the stored order or the creation time.
pub fn effective_order(order: Option<f64>, created_at: i64) -> f64 {
    order.unwrap_or(created_at as f64)
}

/// Order for an entity placed between `prev` and `next`.
///
/// Returns `None` when there is no neighbour on either side.
pub fn key_between(prev: Option<f64>, next: Option<f64>) -> Option<f64> {
    match (prev, next) {
        (None, None) => None,
        (None, Some(next)) => Some(next - ORDER_GAP),
        (Some(prev), None) => Some(prev + ORDER_GAP),
        (Some(prev), Some(next)) => Some(prev + (next - prev) / 2.0),
    }
}

/// Computes the order of `ids[new_index]` from its neighbours in `ids`.
///
/// `ids` is the sibling list in its desired final order. Returns `None` for
/// lists with fewer than two entries, an out-of-range index, or a neighbour
/// the lookup does not know.
pub fn order_for_move<Id, F>(ids: &[Id], new_index: usize, lookup: F) -> Option<f64>
where
    F: Fn(&Id) -> Option<f64>,
{
    let (prev, next) = neighbour_orders(ids, new_index, lookup)?;
    key_between(prev, next)
}

pub(crate) fn neighbour_orders<Id, F>(
    ids: &[Id],
    new_index: usize,
    lookup: F,
) -> Option<(Option<f64>, Option<f64>)>
where
    F: Fn(&Id) -> Option<f64>,
{
    if ids.len() < 2 || new_index >= ids.len() {
        return None;
    }
    let prev = match new_index.checked_sub(1) {
        Some(index) => Some(lookup(&ids[index])?),
        None => None,
    };
    let next = match ids.get(new_index + 1) {
        Some(id) => Some(lookup(id)?),
        None => None,
    };
    Some((prev, next))
}

/// Whether `candidate` can no longer be told apart from its neighbours.
///
/// True when the value is not strictly between `prev` and `next` or sits
/// closer than [`REBALANCE_EPSILON`] to either of them.
pub fn needs_rebalance(prev: Option<f64>, next: Option<f64>, candidate: f64) -> bool {
    if !candidate.is_finite() {
        return true;
    }
    let after_prev = prev.map_or(true, |prev| candidate - prev >= REBALANCE_EPSILON);
    let before_next = next.map_or(true, |next| next - candidate >= REBALANCE_EPSILON);
    !(after_prev && before_next)
}

/// Evenly spaced orders for `ids` in the given sequence.
pub fn rebalance<Id: Clone>(ids: &[Id]) -> Vec<(Id, f64)> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| (id.clone(), index as f64 * ORDER_GAP))
        .collect()
}

/// Order for a new entity sent to the end of a group.
pub fn append_order(current_max: Option<f64>) -> f64 {
    current_max.map_or(0.0, |max| max + ORDER_GAP)
}

/// Assigns orders to entries that have none.
///
/// New orders are appended after the larger of `floor` (e.g. the stored
/// maximum) and the largest order already in `entries`. Entries that carry
/// an order keep it. Returns the number of entries that received one.
pub fn assign_missing_orders<T: Orderable>(entries: &mut [T], floor: Option<f64>) -> usize {
    let mut max = entries
        .iter()
        .filter_map(Orderable::order)
        .fold(floor, |acc: Option<f64>, value| {
            Some(acc.map_or(value, |current| current.max(value)))
        });
    let mut assigned = 0;
    for entry in entries.iter_mut() {
        if entry.order().is_none() {
            let order = append_order(max);
            entry.set_order(order);
            max = Some(order);
            assigned += 1;
        }
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::{
        append_order, assign_missing_orders, key_between, needs_rebalance, order_for_move,
        rebalance, Orderable, SortKey, ORDER_GAP,
    };
    use proptest::prelude::*;
    use std::collections::HashMap;

    struct Slot(Option<f64>);

    impl Orderable for Slot {
        fn order(&self) -> Option<f64> {
            self.0
        }

        fn set_order(&mut self, order: f64) {
            self.0 = Some(order);
        }
    }

    fn lookup<'a>(map: &'a HashMap<&'static str, f64>) -> impl Fn(&&'static str) -> Option<f64> + 'a {
        move |id: &&'static str| map.get(id).copied()
    }

    #[test]
    fn moving_to_front_subtracts_gap_from_first_neighbour() {
        let orders = HashMap::from([("x", 10.0), ("y", 20.0), ("z", 30.0)]);
        let ids = ["y", "x", "z"];
        let order = order_for_move(&ids, 0, lookup(&orders)).expect("front move");
        assert_eq!(order, 10.0 - ORDER_GAP);
        assert!(order < 10.0);
    }

    #[test]
    fn repeated_insertions_take_midpoints() {
        assert_eq!(key_between(Some(10.0), Some(20.0)), Some(15.0));
        assert_eq!(key_between(Some(10.0), Some(15.0)), Some(12.5));
        assert_eq!(key_between(Some(30.0), None), Some(30.0 + ORDER_GAP));
        assert_eq!(key_between(None, None), None);
    }

    #[test]
    fn degenerate_lists_and_unknown_neighbours_are_noops() {
        let orders = HashMap::from([("x", 10.0)]);
        assert_eq!(order_for_move(&["x"], 0, lookup(&orders)), None);
        assert_eq!(order_for_move::<&str, _>(&[], 0, lookup(&orders)), None);
        assert_eq!(order_for_move(&["x", "ghost"], 0, lookup(&orders)), None);
        assert_eq!(order_for_move(&["x", "x"], 5, lookup(&orders)), None);
    }

    #[test]
    fn collapsed_gap_requests_rebalance() {
        let prev = 1.0;
        let next = prev + 1e-9;
        let candidate = key_between(Some(prev), Some(next)).expect("midpoint");
        assert!(needs_rebalance(Some(prev), Some(next), candidate));
        assert!(!needs_rebalance(Some(10.0), Some(20.0), 15.0));
        assert!(needs_rebalance(Some(10.0), Some(20.0), 10.0));
    }

    #[test]
    fn halving_the_same_gap_eventually_needs_rebalance() {
        let prev = 10.0;
        let mut next = 20.0;
        let mut rounds = 0;
        loop {
            let candidate = key_between(Some(prev), Some(next)).expect("midpoint");
            if needs_rebalance(Some(prev), Some(next), candidate) {
                break;
            }
            next = candidate;
            rounds += 1;
            assert!(rounds < 200, "precision never exhausted");
        }
        assert!(rounds > 10);
    }

    #[test]
    fn rebalance_spaces_entries_evenly() {
        let spaced = rebalance(&["a", "b", "c"]);
        assert_eq!(spaced, vec![("a", 0.0), ("b", ORDER_GAP), ("c", 2.0 * ORDER_GAP)]);
    }

    #[test]
    fn assign_missing_orders_keeps_existing_values() {
        let mut slots = vec![Slot(Some(50.0)), Slot(None), Slot(Some(10.0)), Slot(None)];
        let assigned = assign_missing_orders(&mut slots, None);
        assert_eq!(assigned, 2);
        assert_eq!(slots[0].0, Some(50.0));
        assert_eq!(slots[1].0, Some(50.0 + ORDER_GAP));
        assert_eq!(slots[2].0, Some(10.0));
        assert_eq!(slots[3].0, Some(50.0 + 2.0 * ORDER_GAP));

        let mut fresh = vec![Slot(None)];
        assert_eq!(assign_missing_orders(&mut fresh, Some(900.0)), 1);
        assert_eq!(fresh[0].0, Some(900.0 + ORDER_GAP));
    }

    #[test]
    fn equal_orders_fall_back_to_creation_then_tie() {
        let a = SortKey::new(Some(5.0), 100, "b");
        let b = SortKey::new(Some(5.0), 200, "a");
        let c = SortKey::new(Some(5.0), 200, "c");
        assert!(a < b);
        assert!(b < c);
        assert!(SortKey::new(None, 7, "x") < SortKey::new(Some(8.0), 0, "x"));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn insertion_lands_strictly_between_neighbours(
            raw in prop::collection::btree_set(-1_000_000i64..1_000_000, 1..20),
            position in 0usize..64,
        ) {
            let orders: Vec<f64> = raw.into_iter().map(|value| value as f64).collect();
            let k = position % (orders.len() + 1);
            let prev = k.checked_sub(1).map(|index| orders[index]);
            let next = orders.get(k).copied();
            let candidate = key_between(prev, next).expect("non-empty group");
            if let Some(prev) = prev {
                prop_assert!(prev < candidate);
            }
            if let Some(next) = next {
                prop_assert!(candidate < next);
            }
        }

        #[test]
        fn repeated_append_is_strictly_increasing(start in -1.0e9f64..1.0e9, rounds in 1usize..200) {
            let mut max = Some(start);
            for _ in 0..rounds {
                let next = append_order(max);
                prop_assert!(next > max.unwrap_or(f64::MIN));
                max = Some(next);
            }
        }
    }
}
