//! Turning a selection into an allocation, shrinking split items so the group consumes an
//! exact target.

use std::collections::HashSet;

use thiserror::Error;

use crate::model::Allocation;
use crate::selector::Selection;
use crate::types::{ItemId, Quantity, QuantityPool, sum_quantities};

/// Internal consistency failure of the split arithmetic.
///
/// Conservation of quantities is correctness-critical; this error aborts candidate generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("split consumed {consumed} units instead of the requested {target}")]
    InexactSplit { target: Quantity, consumed: Quantity },
}

/// Result of consuming a selection from the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitOutcome {
    pub allocation: Allocation,
    pub consumed: Quantity,
    pub remaining: QuantityPool,
}

/// Consumes `selection` from `pool`.
///
/// With `splits == 0` every selected item is consumed wholesale. Otherwise the `splits` items
/// at the high end of the selection give back just enough quantity that the group consumes
/// exactly `target`; the given-back units stay in the pool for later groups.
///
/// Returns `Ok(None)` when the selection cannot be shrunk onto `target` (too few picks, a
/// total below the target, or an excess larger than the splittable quantity).
pub fn execute(
    pool: &QuantityPool,
    selection: Selection,
    splits: usize,
    target: Quantity,
) -> Result<Option<SplitOutcome>, SplitError> {
    let chosen: HashSet<&ItemId> = selection.picks.iter().map(|(id, _)| id).collect();
    let mut remaining: Vec<(ItemId, Quantity)> = pool
        .entries()
        .iter()
        .filter(|(id, _)| !chosen.contains(id))
        .cloned()
        .collect();

    if splits == 0 {
        return Ok(Some(SplitOutcome {
            consumed: selection.total,
            allocation: Allocation::new(selection.picks),
            remaining: QuantityPool::from_entries(remaining),
        }));
    }

    if splits > selection.picks.len() {
        return Ok(None);
    }
    let Some(excess) = selection.total.checked_sub(target) else {
        return Ok(None);
    };

    let (kept, cut) = selection.picks.split_at(selection.picks.len() - splits);
    let cut_total = sum_quantities(cut);
    if excess > cut_total {
        return Ok(None);
    }

    let removals = proportional_removals(cut, cut_total, excess);
    let mut slots = kept.to_vec();
    let mut given_back = 0;
    for ((id, quantity), removed) in cut.iter().zip(removals) {
        slots.push((id.clone(), quantity - removed));
        if removed > 0 {
            remaining.push((id.clone(), removed));
        }
        given_back += removed;
    }

    let consumed = selection.total - given_back;
    if consumed != target {
        return Err(SplitError::InexactSplit { target, consumed });
    }

    Ok(Some(SplitOutcome {
        allocation: Allocation::new(slots),
        consumed,
        remaining: QuantityPool::from_entries(remaining),
    }))
}

/// Splits `excess` over `cut` in proportion to each item's quantity.
///
/// Every item gives back `floor(q * excess / cut_total)`; the rounding remainder is taken from
/// the last (largest) item first and moves to earlier items only where an item has nothing
/// left to give.
fn proportional_removals(
    cut: &[(ItemId, Quantity)],
    cut_total: Quantity,
    excess: Quantity,
) -> Vec<Quantity> {
    if cut_total == 0 {
        return vec![0; cut.len()];
    }

    let mut removals: Vec<Quantity> = cut
        .iter()
        .map(|(_, q)| ((*q as u128 * excess as u128) / cut_total as u128) as Quantity)
        .collect();

    let mut remainder = excess - removals.iter().sum::<Quantity>();
    for (removed, (_, quantity)) in removals.iter_mut().zip(cut).rev() {
        if remainder == 0 {
            break;
        }
        let take = remainder.min(quantity - *removed);
        *removed += take;
        remainder -= take;
    }
    removals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::window_average;
    use std::sync::Arc;

    fn id(s: &str) -> ItemId {
        Arc::from(s)
    }

    fn selection(pairs: &[(&str, Quantity)]) -> Selection {
        let picks: Vec<(ItemId, Quantity)> = pairs.iter().map(|(i, q)| (id(i), *q)).collect();
        Selection {
            total: sum_quantities(&picks),
            picks,
        }
    }

    #[test]
    fn wholesale_consumption_removes_selected_items() {
        let pool = QuantityPool::from_entries(vec![(id("a"), 5), (id("b"), 7), (id("c"), 9)]);
        let outcome = execute(&pool, selection(&[("a", 5), ("b", 7)]), 0, 0)
            .unwrap()
            .unwrap();
        assert_eq!(outcome.consumed, 12);
        assert_eq!(outcome.allocation.len(), 2);
        assert_eq!(outcome.remaining.entries(), &[(id("c"), 9)]);
    }

    #[test]
    fn split_hits_target_exactly() {
        let pool = QuantityPool::from_entries(vec![(id("x"), 10), (id("y"), 10), (id("z"), 10)]);
        let outcome = execute(&pool, selection(&[("x", 10), ("y", 10), ("z", 10)]), 2, 24)
            .unwrap()
            .unwrap();

        assert_eq!(outcome.consumed, 24);
        assert_eq!(outcome.allocation.total(), 24);
        assert_eq!(outcome.allocation.len(), 3);
        assert_eq!(outcome.allocation.quantity_of("x"), Some(10));
        assert_eq!(outcome.remaining.total(), 6);
        assert_eq!(outcome.remaining.len(), 2);
        assert_eq!(
            outcome.allocation.quantity_of("y").unwrap() + outcome.remaining.quantity_of("y").unwrap(),
            10
        );
    }

    #[test]
    fn rounding_remainder_is_absorbed() {
        let pool = QuantityPool::from_entries(vec![(id("a"), 1), (id("b"), 1), (id("c"), 100)]);
        let picks = selection(&[("a", 1), ("b", 1), ("c", 100)]);
        let outcome = execute(&pool, picks, 3, 101).unwrap().unwrap();
        assert_eq!(outcome.consumed, 101);
        assert_eq!(outcome.remaining.total(), 1);
        assert!(outcome.allocation.slots.iter().all(|(_, q)| *q <= 100));
    }

    #[test]
    fn fully_given_back_items_keep_their_slot() {
        let pool = QuantityPool::from_entries(vec![(id("a"), 4), (id("b"), 6)]);
        let outcome = execute(&pool, selection(&[("a", 4), ("b", 6)]), 1, 4)
            .unwrap()
            .unwrap();
        assert_eq!(outcome.allocation.slots, vec![(id("a"), 4), (id("b"), 0)]);
        assert_eq!(outcome.remaining.quantity_of("b"), Some(6));
    }

    #[test]
    fn infeasible_splits_are_skipped() {
        let pool = QuantityPool::from_entries(vec![(id("a"), 4), (id("b"), 6)]);
        // total below target
        assert_eq!(execute(&pool, selection(&[("a", 4), ("b", 6)]), 1, 11), Ok(None));
        // excess larger than the shrinkable item
        assert_eq!(execute(&pool, selection(&[("a", 4), ("b", 6)]), 1, 3), Ok(None));
        // more splits than picks
        assert_eq!(execute(&pool, selection(&[("a", 4)]), 2, 2), Ok(None));
    }

    #[test]
    fn split_of_a_window_selection_conserves_the_pool() {
        let pool = QuantityPool::from_entries(
            [3, 8, 13, 21, 34, 55]
                .iter()
                .enumerate()
                .map(|(i, q)| (Arc::from(format!("v{}", i).as_str()), *q as Quantity)),
        );
        let picks = window_average(pool.entries(), 3, 90);
        let before = pool.total();
        let outcome = execute(&pool, picks, 2, 80).unwrap().unwrap();
        assert_eq!(outcome.consumed, 80);
        assert_eq!(outcome.consumed + outcome.remaining.total(), before);
    }
}
