//! Data models for the version splitting search.
//!
//! This module defines the records the search consumes and produces:
//! - `Item`: a version with the total quantity that has to be distributed
//! - `ZipOccurrences`: ordered zip code → item occurrence lists used for scoring
//! - `Allocation`: the `(item, quantity)` pairs placed into one configuration group
//! - `Candidate`: one allocation per configuration group, covering the whole facility

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::types::{ItemId, Quantity, sum_quantities};

/// Input-shape errors, raised before any data reaches the search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Item id must not be empty")]
    EmptyItemId,
    #[error("Item '{0}' is listed more than once")]
    DuplicateItem(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Line configuration {0} is defined more than once")]
    DuplicateConfiguration(u32),
    #[error("Line {line} references unknown configuration {configuration}")]
    UnknownConfiguration { line: usize, configuration: u32 },
    #[error("Zip code must not be empty")]
    EmptyZipCode,
    #[error("Zip code '{zip_code}' references unknown item '{item}'")]
    UnknownOccurrenceItem { zip_code: String, item: String },
}

/// A version with the number of units that must be placed on the facility.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub quantity: Quantity,
}

impl Item {
    /// Creates a new item, rejecting blank identifiers.
    ///
    /// # Examples
    /// ```
    /// use split_it_now::model::Item;
    ///
    /// assert!(Item::new("v-17", 1200).is_ok());
    /// assert!(Item::new("  ", 5).is_err());
    /// ```
    pub fn new(id: impl AsRef<str>, quantity: Quantity) -> Result<Self, ValidationError> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(ValidationError::EmptyItemId);
        }
        Ok(Self {
            id: Arc::from(id),
            quantity,
        })
    }
}

/// Rejects item lists that contain the same id twice.
pub fn validate_items(items: &[Item]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.id.trim().is_empty() {
            return Err(ValidationError::EmptyItemId);
        }
        if !seen.insert(item.id.clone()) {
            return Err(ValidationError::DuplicateItem(item.id.to_string()));
        }
    }
    Ok(())
}

/// Item occurrences of a single zip code, in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipCodeOccurrences {
    pub zip_code: String,
    pub items: Vec<ItemId>,
}

/// Zip code → occurrence list mapping.
///
/// Zip codes keep the order in which they were first seen; the scorer sweeps them in that order.
#[derive(Clone, Debug, Default)]
pub struct ZipOccurrences {
    entries: Vec<ZipCodeOccurrences>,
    index: HashMap<String, usize>,
}

impl ZipOccurrences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one occurrence of `item` to `zip_code`.
    pub fn push(&mut self, zip_code: &str, item: ItemId) {
        match self.index.get(zip_code) {
            Some(&idx) => self.entries[idx].items.push(item),
            None => {
                self.index.insert(zip_code.to_string(), self.entries.len());
                self.entries.push(ZipCodeOccurrences {
                    zip_code: zip_code.to_string(),
                    items: vec![item],
                });
            }
        }
    }

    /// Appends a whole occurrence list; repeated zip codes are merged.
    pub fn extend_zip(&mut self, zip_code: &str, items: impl IntoIterator<Item = ItemId>) {
        for item in items {
            self.push(zip_code, item);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZipCodeOccurrences> {
        self.entries.iter()
    }

    /// Number of distinct zip codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of occurrences over all zip codes.
    pub fn occurrence_count(&self) -> usize {
        self.entries.iter().map(|z| z.items.len()).sum()
    }

    /// Derives one item per distinct id, with the occurrence count as quantity.
    ///
    /// Items are returned in first-seen order.
    pub fn item_counts(&self) -> Vec<Item> {
        let mut order: Vec<ItemId> = Vec::new();
        let mut counts: HashMap<ItemId, Quantity> = HashMap::new();
        for zip in &self.entries {
            for item in &zip.items {
                let count = counts.entry(item.clone()).or_insert_with(|| {
                    order.push(item.clone());
                    0
                });
                *count += 1;
            }
        }
        order
            .into_iter()
            .map(|id| {
                let quantity = counts[&id];
                Item { id, quantity }
            })
            .collect()
    }

    /// Checks that every zip code is named and only references known items.
    pub fn validate_against(&self, items: &[Item]) -> Result<(), ValidationError> {
        let known: HashSet<&str> = items.iter().map(|i| i.id.as_ref()).collect();
        for zip in &self.entries {
            if zip.zip_code.trim().is_empty() {
                return Err(ValidationError::EmptyZipCode);
            }
            if let Some(unknown) = zip.items.iter().find(|i| !known.contains(i.as_ref())) {
                return Err(ValidationError::UnknownOccurrenceItem {
                    zip_code: zip.zip_code.clone(),
                    item: unknown.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The `(item, quantity)` pairs placed into one configuration group, one pair per slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allocation {
    pub slots: Vec<(ItemId, Quantity)>,
}

impl Allocation {
    pub fn new(slots: Vec<(ItemId, Quantity)>) -> Self {
        Self { slots }
    }

    /// Total quantity consumed by this group.
    pub fn total(&self) -> Quantity {
        sum_quantities(&self.slots)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn quantity_of(&self, id: &str) -> Option<Quantity> {
        self.slots
            .iter()
            .find(|(item, _)| item.as_ref() == id)
            .map(|(_, q)| *q)
    }
}

/// One complete assignment: an allocation per configuration group, in group order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Candidate {
    pub allocations: Vec<Allocation>,
}

impl Candidate {
    pub fn new(allocations: Vec<Allocation>) -> Self {
        Self { allocations }
    }

    /// Quantity placed per item, summed across all groups.
    pub fn item_totals(&self) -> HashMap<ItemId, Quantity> {
        let mut totals: HashMap<ItemId, Quantity> = HashMap::new();
        for allocation in &self.allocations {
            for (item, quantity) in &allocation.slots {
                *totals.entry(item.clone()).or_insert(0) += quantity;
            }
        }
        totals
    }

    /// Total quantity placed across the facility.
    pub fn total(&self) -> Quantity {
        self.allocations.iter().map(Allocation::total).sum()
    }
}
