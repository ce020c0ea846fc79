//! Global re-check of generated candidates.
//!
//! The search only checks each group locally; this pass verifies the whole candidate again:
//! every group stays inside its bounds and every item is placed with exactly its input quantity.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::facility::ConfigGroup;
use crate::model::{Candidate, Item};
use crate::types::{ItemId, Quantity};

/// First defect found in a rejected candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateDefect {
    #[error("candidate has {found} allocations for {expected} configuration groups")]
    GroupCountMismatch { expected: usize, found: usize },
    #[error("group {group} fills {slots} slots, allowed are {min}..={max}")]
    SlotCountOutOfRange {
        group: usize,
        slots: usize,
        min: usize,
        max: usize,
    },
    #[error("group {group} consumes {total}, below the line minimum {minimum}")]
    BelowLineMinimum {
        group: usize,
        total: Quantity,
        minimum: Quantity,
    },
    #[error("group {group} consumes {total}, above the group maximum {maximum}")]
    AboveGroupMaximum {
        group: usize,
        total: Quantity,
        maximum: Quantity,
    },
    #[error("item '{item}' is placed {placed} times instead of {expected}")]
    QuantityMismatch {
        item: String,
        expected: Quantity,
        placed: Quantity,
    },
    #[error("item '{0}' is not part of the input")]
    UnknownItem(String),
}

/// Checks candidates against the groups they were generated for and the original item list.
pub struct SolutionValidator<'a> {
    groups: &'a [ConfigGroup],
    expected: HashMap<ItemId, Quantity>,
}

impl<'a> SolutionValidator<'a> {
    pub fn new(groups: &'a [ConfigGroup], items: &[Item]) -> Self {
        Self {
            groups,
            expected: items.iter().map(|i| (i.id.clone(), i.quantity)).collect(),
        }
    }

    /// Returns the first defect of `candidate`, if any.
    ///
    /// The line minimum is compared with the group's aggregate total, like during the search.
    pub fn check(&self, candidate: &Candidate) -> Result<(), CandidateDefect> {
        if candidate.allocations.len() != self.groups.len() {
            return Err(CandidateDefect::GroupCountMismatch {
                expected: self.groups.len(),
                found: candidate.allocations.len(),
            });
        }

        for (idx, (allocation, group)) in candidate.allocations.iter().zip(self.groups).enumerate() {
            if !group.slot_range().contains(&allocation.len()) {
                return Err(CandidateDefect::SlotCountOutOfRange {
                    group: idx,
                    slots: allocation.len(),
                    min: group.pockets,
                    max: group.slot_capacity(),
                });
            }
            let total = allocation.total();
            if total < group.min_quantity_per_line {
                return Err(CandidateDefect::BelowLineMinimum {
                    group: idx,
                    total,
                    minimum: group.min_quantity_per_line,
                });
            }
            if total > group.max_quantity_all_lines {
                return Err(CandidateDefect::AboveGroupMaximum {
                    group: idx,
                    total,
                    maximum: group.max_quantity_all_lines,
                });
            }
        }

        let placed = candidate.item_totals();
        if let Some(unknown) = placed.keys().find(|item| !self.expected.contains_key(*item)) {
            return Err(CandidateDefect::UnknownItem(unknown.to_string()));
        }
        // Items with zero quantity never enter the pool and may be absent.
        for (item, &expected) in &self.expected {
            let actual = placed.get(item).copied().unwrap_or(0);
            if actual != expected {
                return Err(CandidateDefect::QuantityMismatch {
                    item: item.to_string(),
                    expected,
                    placed: actual,
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(&self, candidate: &Candidate) -> bool {
        self.check(candidate).is_ok()
    }

    /// Keeps the valid candidates, preserving their order.
    pub fn retain_valid(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let before = candidates.len();
        let valid: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| match self.check(candidate) {
                Ok(()) => true,
                Err(defect) => {
                    debug!(%defect, "discarding candidate");
                    false
                }
            })
            .collect();
        debug!(kept = valid.len(), discarded = before - valid.len(), "candidates validated");
        valid
    }
}
