//! Bounded backtracking search over the configuration groups.
//!
//! Groups are filled in order. For every group except the last the search enumerates the slot
//! count, the number of split items and the selection strategy, consumes the selection from the
//! remaining pool and recurses into the following groups. The last group takes whatever is left.
//!
//! Every branch owns its pool; the partial candidate is a persistent list shared between
//! siblings, so branching never copies earlier allocations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::facility::{ConfigGroup, max_quantity, slot_capacity};
use crate::model::{Allocation, Candidate, Item};
use crate::selector::SelectionStrategy;
use crate::split::{self, SplitError};
use crate::types::{Quantity, QuantityPool};

/// Budgets that stop the search early. `None` means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchLimits {
    /// Maximum number of candidates to collect.
    pub max_candidates: Option<usize>,
    /// Maximum number of expanded search nodes.
    pub max_nodes: Option<u64>,
    /// Wall-clock budget for the whole search.
    pub time_limit: Option<Duration>,
}

impl SearchLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Candidates produced by one search run.
#[derive(Clone, Debug, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<Candidate>,
    pub nodes_explored: u64,
    /// `true` when a budget stopped the search before it was exhausted.
    pub truncated: bool,
    pub split_budget: usize,
}

/// One choice for the group being filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Step {
    slots: usize,
    splits: usize,
    strategy: SelectionStrategy,
}

/// Enumerates slot counts, then split counts, then strategies.
fn steps(group: &ConfigGroup, split_budget: usize) -> impl Iterator<Item = Step> {
    group.slot_range().flat_map(move |slots| {
        (0..=split_budget.min(slots)).flat_map(move |splits| {
            SelectionStrategy::ALL.into_iter().map(move |strategy| Step {
                slots,
                splits,
                strategy,
            })
        })
    })
}

/// Quantity ceiling handed to the selector: enough above `expected` that splitting `splits` of
/// `slots` items can trim the selection back down to it.
fn selection_limit(expected: Quantity, slots: usize, splits: usize) -> Quantity {
    let scaled = expected as u128 * (slots + splits) as u128 / slots as u128;
    Quantity::try_from(scaled).unwrap_or(Quantity::MAX)
}

/// Allocations chosen so far, newest first.
#[derive(Clone, Debug, Default)]
struct Trail(Option<Arc<TrailNode>>);

#[derive(Debug)]
struct TrailNode {
    allocation: Allocation,
    parent: Trail,
}

impl Trail {
    fn push(&self, allocation: Allocation) -> Trail {
        Trail(Some(Arc::new(TrailNode {
            allocation,
            parent: self.clone(),
        })))
    }

    fn to_candidate(&self) -> Candidate {
        let mut allocations = Vec::new();
        let mut cursor = self.0.as_deref();
        while let Some(node) = cursor {
            allocations.push(node.allocation.clone());
            cursor = node.parent.0.as_deref();
        }
        allocations.reverse();
        Candidate::new(allocations)
    }
}

/// State owned by one branch.
struct Frame<'g> {
    groups: &'g [ConfigGroup],
    pool: QuantityPool,
    split_budget: usize,
    pieces_left: Quantity,
    trail: Trail,
}

/// Shared budget bookkeeping; safe to use from several workers.
struct Budget {
    nodes: AtomicU64,
    candidates: AtomicUsize,
    exhausted: AtomicBool,
    max_nodes: Option<u64>,
    max_candidates: Option<usize>,
    deadline: Option<Instant>,
}

impl Budget {
    fn new(limits: &SearchLimits) -> Self {
        Self {
            nodes: AtomicU64::new(0),
            candidates: AtomicUsize::new(0),
            exhausted: AtomicBool::new(false),
            max_nodes: limits.max_nodes,
            max_candidates: limits.max_candidates,
            deadline: limits.time_limit.map(|limit| Instant::now() + limit),
        }
    }

    #[inline]
    fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }

    /// Counts a node; returns `false` once any budget is spent.
    fn enter_node(&self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        let visited = self.nodes.fetch_add(1, Ordering::Relaxed) + 1;
        let over_nodes = self.max_nodes.is_some_and(|max| visited > max);
        let over_time = self.deadline.is_some_and(|d| Instant::now() >= d);
        if over_nodes || over_time {
            self.exhausted.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Reserves room for one more candidate.
    fn record_candidate(&self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        let found = self.candidates.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(max) = self.max_candidates {
            if found > max {
                self.exhausted.store(true, Ordering::Relaxed);
                return false;
            }
            if found == max {
                self.exhausted.store(true, Ordering::Relaxed);
            }
        }
        true
    }
}

/// Generates candidate allocations of `items` onto ordered configuration groups.
pub struct SolutionSearch<'a> {
    groups: &'a [ConfigGroup],
    items: &'a [Item],
    limits: SearchLimits,
    parallel: bool,
}

impl<'a> SolutionSearch<'a> {
    /// Creates a search over `groups`, which must already be in merge order.
    pub fn new(groups: &'a [ConfigGroup], items: &'a [Item]) -> Self {
        Self {
            groups,
            items,
            limits: SearchLimits::unbounded(),
            parallel: false,
        }
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Distributes the first group's choices over the rayon pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Total number of item splits allowed across the facility: slots minus distinct items.
    ///
    /// Saturates at zero; with more items than slots every multi-group branch is pruned anyway.
    pub fn split_budget(&self) -> usize {
        slot_capacity(self.groups).saturating_sub(self.items.len())
    }

    /// Runs the search.
    ///
    /// Infeasible inputs yield an empty candidate list. Only a broken split invariant is an error.
    pub fn generate(&self) -> Result<SearchOutcome, SplitError> {
        let split_budget = self.split_budget();
        let pool = QuantityPool::from_entries(self.items.iter().map(|i| (i.id.clone(), i.quantity)));
        let root = Frame {
            groups: self.groups,
            pieces_left: pool.total(),
            pool,
            split_budget,
            trail: Trail::default(),
        };
        debug!(
            groups = self.groups.len(),
            items = self.items.len(),
            pieces = root.pieces_left,
            split_budget,
            "starting candidate search"
        );

        let budget = Budget::new(&self.limits);
        let mut candidates = self.search_root(&root, &budget)?;
        if let Some(max) = self.limits.max_candidates {
            candidates.truncate(max);
        }

        let outcome = SearchOutcome {
            candidates,
            nodes_explored: budget.nodes.load(Ordering::Relaxed),
            truncated: budget.is_exhausted(),
            split_budget,
        };
        info!(
            candidates = outcome.candidates.len(),
            nodes = outcome.nodes_explored,
            truncated = outcome.truncated,
            "candidate search finished"
        );
        Ok(outcome)
    }

    fn search_root(&self, root: &Frame<'_>, budget: &Budget) -> Result<Vec<Candidate>, SplitError> {
        let Some((group, tail)) = root.groups.split_first() else {
            return Ok(Vec::new());
        };
        if tail.is_empty() {
            let mut found = Vec::new();
            self.close(root, group, budget, &mut found);
            return Ok(found);
        }

        let root_steps: Vec<Step> = steps(group, root.split_budget).collect();
        let explore = |step: &Step| -> Result<Vec<Candidate>, SplitError> {
            let mut found = Vec::new();
            self.explore(root, *step, budget, &mut found)?;
            Ok(found)
        };

        let batches: Vec<Vec<Candidate>> = if self.parallel {
            root_steps.par_iter().map(explore).collect::<Result<_, _>>()?
        } else {
            root_steps.iter().map(explore).collect::<Result<_, _>>()?
        };
        Ok(batches.into_iter().flatten().collect())
    }

    fn descend(
        &self,
        frame: &Frame<'_>,
        budget: &Budget,
        out: &mut Vec<Candidate>,
    ) -> Result<(), SplitError> {
        let Some((group, tail)) = frame.groups.split_first() else {
            return Ok(());
        };
        if tail.is_empty() {
            self.close(frame, group, budget, out);
            return Ok(());
        }

        for step in steps(group, frame.split_budget) {
            if budget.is_exhausted() {
                break;
            }
            self.explore(frame, step, budget, out)?;
        }
        Ok(())
    }

    /// Applies one step to the frame's head group and recurses into the tail.
    fn explore(
        &self,
        frame: &Frame<'_>,
        step: Step,
        budget: &Budget,
        out: &mut Vec<Candidate>,
    ) -> Result<(), SplitError> {
        let Some((group, tail)) = frame.groups.split_first() else {
            return Ok(());
        };
        if !budget.enter_node() {
            return Ok(());
        }

        // Items left for later groups must still fit into their slots.
        if frame.pool.len() + step.splits > slot_capacity(tail) + step.slots {
            trace!(?step, "pruned: deferred items exceed later capacity");
            return Ok(());
        }
        if frame.pool.len() <= step.splits {
            return Ok(());
        }

        let expected = frame
            .pieces_left
            .checked_sub(max_quantity(tail))
            .unwrap_or_else(|| frame.pieces_left.min(group.max_quantity_all_lines));
        let limit = selection_limit(expected, step.slots, step.splits);
        let selection = step
            .strategy
            .select(frame.pool.entries(), step.slots, step.splits, limit);

        let Some(outcome) = split::execute(&frame.pool, selection, step.splits, expected)? else {
            trace!(?step, expected, "pruned: selection cannot be split onto target");
            return Ok(());
        };
        if outcome.remaining.is_empty() {
            return Ok(());
        }
        if outcome.allocation.len() != step.slots || !group.accepts_total(outcome.consumed) {
            trace!(?step, consumed = outcome.consumed, "pruned: group bounds");
            return Ok(());
        }

        let child = Frame {
            groups: tail,
            split_budget: frame.split_budget - step.splits,
            pieces_left: frame.pieces_left.saturating_sub(outcome.consumed),
            pool: outcome.remaining,
            trail: frame.trail.push(outcome.allocation),
        };
        self.descend(&child, budget, out)
    }

    /// Fills the last group with every remaining item.
    fn close(&self, frame: &Frame<'_>, group: &ConfigGroup, budget: &Budget, out: &mut Vec<Candidate>) {
        let allocation = Allocation::new(frame.pool.entries().to_vec());
        if allocation.len() != group.pockets || !group.accepts_total(allocation.total()) {
            return;
        }
        if budget.record_candidate() {
            out.push(frame.trail.push(allocation).to_candidate());
        }
    }
}
