//! Package scoring of validated candidates against zip code occurrences.
//!
//! A candidate's allocations are swept from the last (largest) group to the first. During each
//! sweep every zip code tries to match its outstanding occurrences against the allocation's
//! unreserved quantities. A zip code that matches at least `threshold` occurrences commits them
//! and earns one package. Matched occurrences leave the zip code's list either way; unmatched
//! ones wait for the next allocation.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::model::{Allocation, Candidate, ZipOccurrences};
use crate::types::Quantity;

/// Matched occurrences per zip code and allocation needed for a package.
pub const DEFAULT_PACKAGE_THRESHOLD: usize = 10;

/// Result of scoring a candidate set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScoreReport {
    pub best_packages: u64,
    pub best: Option<Candidate>,
    pub best_index: Option<usize>,
    /// Package count of every scored candidate, in input order.
    pub scores: Vec<u64>,
}

pub struct SolutionScorer<'a> {
    zip_occurrences: &'a ZipOccurrences,
    threshold: usize,
    parallel: bool,
}

impl<'a> SolutionScorer<'a> {
    pub fn new(zip_occurrences: &'a ZipOccurrences) -> Self {
        Self {
            zip_occurrences,
            threshold: DEFAULT_PACKAGE_THRESHOLD,
            parallel: false,
        }
    }

    /// Sets the package threshold; values below 1 are raised to 1.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Counts the packages `candidate` yields.
    pub fn score(&self, candidate: &Candidate) -> u64 {
        let mut pending: Vec<Vec<&str>> = self
            .zip_occurrences
            .iter()
            .map(|zip| zip.items.iter().map(|i| i.as_ref()).collect())
            .collect();

        let mut packages = 0;
        for allocation in candidate.allocations.iter().rev() {
            let mut remaining = unreserved(allocation);
            for occurrences in pending.iter_mut() {
                if occurrences.is_empty() {
                    continue;
                }
                if self.sweep(occurrences, &mut remaining) {
                    packages += 1;
                }
            }
        }
        packages
    }

    /// Matches one zip code's occurrences against an allocation; returns `true` for a package.
    fn sweep<'z>(&self, occurrences: &mut Vec<&'z str>, remaining: &mut HashMap<&str, Quantity>) -> bool {
        let mut reserved: HashMap<&'z str, Quantity> = HashMap::new();
        let mut matched = 0;
        occurrences.retain(|item| {
            let available = remaining.get(*item).copied().unwrap_or(0);
            let held = reserved.entry(*item).or_insert(0);
            if available > *held {
                *held += 1;
                matched += 1;
                false
            } else {
                true
            }
        });

        if matched < self.threshold {
            return false;
        }
        for (item, held) in reserved {
            if let Some(left) = remaining.get_mut(item) {
                *left -= held;
            }
        }
        true
    }

    /// Scores every candidate and picks the one with the most packages.
    ///
    /// The first candidate wins ties. Without any package the best candidate is `None`.
    pub fn calculate_solutions(&self, candidates: &[Candidate]) -> ScoreReport {
        let scores: Vec<u64> = if self.parallel {
            candidates.par_iter().map(|c| self.score(c)).collect()
        } else {
            candidates.iter().map(|c| self.score(c)).collect()
        };

        let mut best_index = None;
        let mut best_packages = 0;
        for (idx, &packages) in scores.iter().enumerate() {
            if packages > best_packages {
                best_packages = packages;
                best_index = Some(idx);
            }
        }
        debug!(candidates = candidates.len(), best_packages, ?best_index, "candidates scored");

        ScoreReport {
            best_packages,
            best: best_index.map(|idx| candidates[idx].clone()),
            best_index,
            scores,
        }
    }
}

fn unreserved(allocation: &Allocation) -> HashMap<&str, Quantity> {
    let mut remaining = HashMap::new();
    for (item, quantity) in &allocation.slots {
        *remaining.entry(item.as_ref()).or_insert(0) += quantity;
    }
    remaining
}
