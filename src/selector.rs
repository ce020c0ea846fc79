//! Item selection for a single configuration group.
//!
//! Both strategies work on pool entries sorted ascending by quantity and pick `slots` items
//! whose summed quantity lands as close as possible above a quantity ceiling (`limit`).

use crate::types::{ItemId, Quantity, sum_quantities};

/// How the items for a group's slots are chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SelectionStrategy {
    /// Contiguous window of similarly sized items, refined toward the ceiling.
    WindowAverage,
    /// Reserve the largest items for splitting, fill the rest with a window.
    BiggestFirst,
}

impl SelectionStrategy {
    /// Order in which the search tries the strategies.
    pub const ALL: [SelectionStrategy; 2] =
        [SelectionStrategy::WindowAverage, SelectionStrategy::BiggestFirst];

    pub fn code(&self) -> &'static str {
        match self {
            SelectionStrategy::WindowAverage => "window_average",
            SelectionStrategy::BiggestFirst => "biggest_first",
        }
    }

    /// Runs the strategy.
    ///
    /// # Parameters
    /// * `entries` - Pool entries, ascending by quantity
    /// * `slots` - Number of slots to fill
    /// * `splits` - Number of items that will be split afterwards
    /// * `limit` - Quantity ceiling the selection should reach
    pub fn select(
        &self,
        entries: &[(ItemId, Quantity)],
        slots: usize,
        splits: usize,
        limit: Quantity,
    ) -> Selection {
        match self {
            SelectionStrategy::WindowAverage => window_average(entries, slots, limit),
            SelectionStrategy::BiggestFirst => biggest_first(entries, slots, splits, limit),
        }
    }
}

/// Items picked for a group, ascending by quantity, with their summed quantity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub total: Quantity,
    pub picks: Vec<(ItemId, Quantity)>,
}

impl Selection {
    fn from_picks(picks: Vec<(ItemId, Quantity)>) -> Self {
        Self {
            total: sum_quantities(&picks),
            picks,
        }
    }
}

/// Picks a window of `slots` consecutive items whose sum first reaches `limit`, then trims it.
///
/// The window starts at the smallest items and slides upward until its sum reaches `limit` or
/// the list ends. Afterwards each window member, from the low end, may be exchanged for a
/// smaller item lying before the window as long as the sum stays within `[limit, sum]`; the
/// first position that cannot be improved ends the refinement.
pub fn window_average(entries: &[(ItemId, Quantity)], slots: usize, limit: Quantity) -> Selection {
    if slots == 0 {
        return Selection::default();
    }

    let width = slots.min(entries.len());
    let mut start = 0;
    let mut sum: Quantity = entries[..width].iter().map(|(_, q)| *q).sum();
    while sum < limit && start + width < entries.len() {
        sum = sum - entries[start].1 + entries[start + width].1;
        start += 1;
    }

    let mut window: Vec<usize> = (start..start + width).collect();
    let mut floor = 0;
    for (pos, member) in window.iter_mut().enumerate() {
        let index = start + pos;
        if index <= floor {
            break;
        }

        let current = entries[*member].1;
        let mut replacement = None;
        for j in (floor..index).rev() {
            let swapped = sum - current + entries[j].1;
            if limit <= swapped && swapped <= sum {
                replacement = Some(j);
            } else if j != index - 1 {
                break;
            }
        }

        match replacement {
            Some(j) => {
                sum = sum - current + entries[j].1;
                *member = j;
                floor = j + 1;
            }
            None => break,
        }
    }

    Selection::from_picks(window.into_iter().map(|i| entries[i].clone()).collect())
}

/// Reserves the `splits` largest items and fills the remaining slots with a window.
///
/// The window over the remaining items targets `limit` minus the reserved quantity. If that
/// window reaches its ceiling, the reserved items are appended to it; otherwise the strategy
/// falls back to a plain window over all items.
pub fn biggest_first(
    entries: &[(ItemId, Quantity)],
    slots: usize,
    splits: usize,
    limit: Quantity,
) -> Selection {
    if splits == 0 || splits >= entries.len() {
        return window_average(entries, slots, limit);
    }

    let (rest, biggest) = entries.split_at(entries.len() - splits);
    let adjusted = limit.saturating_sub(sum_quantities(biggest));
    let filler = window_average(rest, slots.saturating_sub(splits), adjusted);
    if filler.total >= adjusted {
        let mut picks = filler.picks;
        picks.extend(biggest.iter().cloned());
        return Selection::from_picks(picks);
    }

    window_average(entries, slots, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pool(quantities: &[Quantity]) -> Vec<(ItemId, Quantity)> {
        quantities
            .iter()
            .enumerate()
            .map(|(i, q)| (Arc::from(format!("v{}", i).as_str()), *q))
            .collect()
    }

    fn quantities(selection: &Selection) -> Vec<Quantity> {
        selection.picks.iter().map(|(_, q)| *q).collect()
    }

    #[test]
    fn zero_slots_selects_nothing() {
        let selection = window_average(&pool(&[1, 2, 3]), 0, 5);
        assert_eq!(selection, Selection::default());
    }

    #[test]
    fn window_slides_until_limit_is_reached() {
        let selection = window_average(&pool(&[1, 2, 3, 4, 10]), 2, 7);
        assert_eq!(quantities(&selection), vec![3, 4]);
        assert_eq!(selection.total, 7);
    }

    #[test]
    fn window_refinement_swaps_in_smaller_items() {
        // [4, 9] = 13 reaches the ceiling; 4 is swapped for 2, landing on 11.
        let entries = pool(&[2, 3, 4, 9]);
        let selection = window_average(&entries, 2, 10);
        assert_eq!(quantities(&selection), vec![2, 9]);
        assert_eq!(selection.total, 11);
        assert_eq!(selection.picks[0].0.as_ref(), "v0");
        assert_eq!(selection.picks[1].0.as_ref(), "v3");
    }

    #[test]
    fn refinement_never_drops_below_limit() {
        let selection = window_average(&pool(&[1, 5, 6, 6, 20]), 2, 10);
        assert_eq!(quantities(&selection), vec![5, 6]);
        assert!(selection.total >= 10);
    }

    #[test]
    fn unreachable_limit_ends_on_largest_window() {
        let selection = window_average(&pool(&[1, 2, 3]), 2, 100);
        assert_eq!(quantities(&selection), vec![2, 3]);
    }

    #[test]
    fn short_pool_returns_every_item() {
        let selection = window_average(&pool(&[4, 8]), 5, 3);
        assert_eq!(selection.picks.len(), 2);
        assert_eq!(selection.total, 12);
    }

    #[test]
    fn biggest_first_appends_reserved_items() {
        let selection = biggest_first(&pool(&[1, 2, 3, 4, 50]), 3, 1, 55);
        assert_eq!(quantities(&selection), vec![2, 3, 50]);
        assert_eq!(selection.total, 55);
    }

    #[test]
    fn biggest_first_falls_back_when_filler_is_short() {
        let selection = biggest_first(&pool(&[1, 2, 3, 4, 50]), 3, 1, 60);
        assert_eq!(quantities(&selection), vec![3, 4, 50]);
        assert_eq!(selection.total, 57);
    }

    #[test]
    fn biggest_first_without_splits_is_a_window() {
        let entries = pool(&[2, 3, 4, 9]);
        assert_eq!(
            SelectionStrategy::BiggestFirst.select(&entries, 2, 0, 10),
            SelectionStrategy::WindowAverage.select(&entries, 2, 0, 10)
        );
    }
}
