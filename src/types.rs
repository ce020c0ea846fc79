//! Shared primitive types for the allocation search.
//!
//! The search never mutates the caller's item records. Every recursive branch owns a
//! `QuantityPool` describing what is still left to place, kept in ascending quantity order
//! because both selection strategies scan the pool from the smallest item upward.

use std::cmp::Ordering;
use std::sync::Arc;

/// Identifier of an item ("version"). Cheap to clone across branches.
pub type ItemId = Arc<str>;

/// Number of units of an item.
pub type Quantity = u64;

/// Remaining quantity per item, ordered ascending by `(quantity, id)`.
///
/// Each branch of the search receives its own pool; siblings never observe each other's
/// consumption. Items whose remaining quantity reaches zero are not kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuantityPool {
    entries: Vec<(ItemId, Quantity)>,
}

impl QuantityPool {
    /// Builds a pool from arbitrary `(id, quantity)` pairs.
    ///
    /// Zero quantities are dropped and the entries are sorted.
    pub fn from_entries(entries: impl IntoIterator<Item = (ItemId, Quantity)>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().filter(|(_, q)| *q > 0).collect();
        entries.sort_by(compare_entries);
        Self { entries }
    }

    /// Entries in ascending quantity order.
    #[inline]
    pub fn entries(&self) -> &[(ItemId, Quantity)] {
        &self.entries
    }

    /// Number of distinct items left.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all remaining quantities.
    pub fn total(&self) -> Quantity {
        self.entries.iter().map(|(_, q)| *q).sum()
    }

    /// Remaining quantity of a single item.
    pub fn quantity_of(&self, id: &str) -> Option<Quantity> {
        self.entries
            .iter()
            .find(|(item, _)| item.as_ref() == id)
            .map(|(_, q)| *q)
    }
}

fn compare_entries(a: &(ItemId, Quantity), b: &(ItemId, Quantity)) -> Ordering {
    a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0))
}

/// Sums the quantities of a slice of `(id, quantity)` pairs.
#[inline]
pub fn sum_quantities(pairs: &[(ItemId, Quantity)]) -> Quantity {
    pairs.iter().map(|(_, q)| *q).sum()
}
