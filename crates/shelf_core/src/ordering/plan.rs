//! Drag-and-drop results turned into order writes.
//!
//! # Responsibility
//! - Adapt a drop outcome (flat move, cross-group move, full column layout)
//!   into the minimal set of `(id, order, group)` updates to persist.
//!
//! # Invariants
//! - Flat and cross-group moves touch only the moved entity, except when the
//!   neighbour gap is exhausted and the target list is rebalanced.
//! - Column layouts use the index within the column as order and the column
//!   index as group.

use super::{append_order, key_between, needs_rebalance, neighbour_orders, rebalance};
use log::warn;

/// One persisted order change. `group` is `Some` only when it changes.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate<Id, G> {
    pub id: Id,
    pub order: f64,
    pub group: Option<G>,
}

/// Writes required by one drop.
#[derive(Debug, Clone, PartialEq)]
pub enum ReorderPlan<Id, G> {
    /// Nothing to persist.
    Noop,
    /// Single-document update.
    Single(OrderUpdate<Id, G>),
    /// Multi-document update committed atomically.
    Batch(Vec<OrderUpdate<Id, G>>),
}

impl<Id, G> ReorderPlan<Id, G> {
    pub fn updates(&self) -> &[OrderUpdate<Id, G>] {
        match self {
            Self::Noop => &[],
            Self::Single(update) => std::slice::from_ref(update),
            Self::Batch(updates) => updates,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.updates().is_empty()
    }
}

/// Outcome of a drag gesture on a list.
#[derive(Debug, Clone, PartialEq)]
pub enum DropResult<Id, G> {
    /// Reorder inside one list. `ids` is the list after the drop.
    Flat {
        ids: Vec<Id>,
        old_index: usize,
        new_index: usize,
    },
    /// Drop into another group. `ids` is the target group after the drop,
    /// moved entity included.
    IntoGroup {
        ids: Vec<Id>,
        new_index: usize,
        group: G,
    },
}

/// Plans the writes for one drop using midpoint insertion.
///
/// `lookup` resolves the current order of a sibling.
pub fn plan_drop<Id, G, F>(drop: DropResult<Id, G>, lookup: F) -> ReorderPlan<Id, G>
where
    Id: Clone,
    F: Fn(&Id) -> Option<f64>,
{
    match drop {
        DropResult::Flat {
            ids,
            old_index,
            new_index,
        } => {
            if old_index == new_index {
                return ReorderPlan::Noop;
            }
            plan_move(&ids, new_index, None, lookup)
        }
        DropResult::IntoGroup {
            ids,
            new_index,
            group,
        } => {
            if new_index >= ids.len() {
                return ReorderPlan::Noop;
            }
            if ids.len() == 1 {
                return ReorderPlan::Single(OrderUpdate {
                    id: ids[0].clone(),
                    order: append_order(None),
                    group: Some(group),
                });
            }
            plan_move(&ids, new_index, Some(group), lookup)
        }
    }
}

/// Plans a full column arrangement: order = row index, group = column index.
pub fn plan_columns<Id: Clone>(columns: &[Vec<Id>]) -> ReorderPlan<Id, i64> {
    let updates: Vec<_> = columns
        .iter()
        .enumerate()
        .flat_map(|(column, ids)| {
            ids.iter().enumerate().map(move |(row, id)| OrderUpdate {
                id: id.clone(),
                order: row as f64,
                group: Some(column as i64),
            })
        })
        .collect();
    if updates.is_empty() {
        ReorderPlan::Noop
    } else {
        ReorderPlan::Batch(updates)
    }
}

fn plan_move<Id, G, F>(
    ids: &[Id],
    new_index: usize,
    group: Option<G>,
    lookup: F,
) -> ReorderPlan<Id, G>
where
    Id: Clone,
    F: Fn(&Id) -> Option<f64>,
{
    let Some((prev, next)) = neighbour_orders(ids, new_index, lookup) else {
        return ReorderPlan::Noop;
    };
    let Some(order) = key_between(prev, next) else {
        return ReorderPlan::Noop;
    };

    if !needs_rebalance(prev, next, order) {
        return ReorderPlan::Single(OrderUpdate {
            id: ids[new_index].clone(),
            order,
            group,
        });
    }

    warn!(
        "event=order_rebalance module=ordering status=warn siblings={} index={} prev={:?} next={:?}",
        ids.len(),
        new_index,
        prev,
        next
    );
    let mut group = group;
    ReorderPlan::Batch(
        rebalance(ids)
            .into_iter()
            .enumerate()
            .map(|(index, (id, order))| OrderUpdate {
                id,
                order,
                group: if index == new_index { group.take() } else { None },
            })
            .collect(),
    )
}
