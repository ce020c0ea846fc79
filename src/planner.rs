//! End-to-end planning: merge the facility into configuration groups, search candidates,
//! re-validate them and pick the best one by package score.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::facility::{ConfigGroup, Facility};
use crate::model::{Item, ValidationError, ZipOccurrences, validate_items};
use crate::scorer::{DEFAULT_PACKAGE_THRESHOLD, ScoreReport, SolutionScorer};
use crate::search::{SearchLimits, SolutionSearch};
use crate::split::SplitError;
use crate::validator::SolutionValidator;

/// Settings for a planning run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlannerConfig {
    pub limits: SearchLimits,
    /// Run search and scoring on the rayon pool.
    pub parallel: bool,
    /// Matched occurrences per zip code needed for one package.
    pub package_threshold: usize,
}

impl PlannerConfig {
    pub const DEFAULT_PARALLEL: bool = true;
    pub const DEFAULT_PACKAGE_THRESHOLD: usize = DEFAULT_PACKAGE_THRESHOLD;

    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            limits: SearchLimits::unbounded(),
            parallel: Self::DEFAULT_PARALLEL,
            package_threshold: Self::DEFAULT_PACKAGE_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlannerConfigBuilder {
    config: PlannerConfig,
}

impl PlannerConfigBuilder {
    /// Caps the number of raw candidates the search collects.
    pub fn max_candidates(mut self, max: Option<usize>) -> Self {
        self.config.limits.max_candidates = max;
        self
    }

    pub fn max_nodes(mut self, max: Option<u64>) -> Self {
        self.config.limits.max_nodes = max;
        self
    }

    pub fn time_limit(mut self, limit: Option<Duration>) -> Self {
        self.config.limits.time_limit = limit;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    pub fn package_threshold(mut self, threshold: usize) -> Self {
        self.config.package_threshold = threshold.max(1);
        self
    }

    pub fn build(self) -> PlannerConfig {
        self.config
    }
}

/// Everything a planning run needs.
#[derive(Clone, Debug)]
pub struct PlanInput {
    pub facility: Facility,
    pub items: Vec<Item>,
    pub zip_occurrences: ZipOccurrences,
}

impl PlanInput {
    pub fn new(facility: Facility, items: Vec<Item>, zip_occurrences: ZipOccurrences) -> Self {
        Self {
            facility,
            items,
            zip_occurrences,
        }
    }

    /// Derives the item quantities from the occurrence counts.
    pub fn from_occurrences(facility: Facility, zip_occurrences: ZipOccurrences) -> Self {
        let items = zip_occurrences.item_counts();
        Self::new(facility, items, zip_occurrences)
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Split(#[from] SplitError),
}

/// Outcome of a planning run.
#[derive(Clone, Debug)]
pub struct PlanReport {
    pub groups: Vec<ConfigGroup>,
    pub split_budget: usize,
    /// Raw candidates produced by the search.
    pub generated: usize,
    /// Candidates that survived validation.
    pub valid: usize,
    pub nodes_explored: u64,
    pub truncated: bool,
    pub score: ScoreReport,
    pub generation_ms: u64,
    pub scoring_ms: u64,
}

/// Progress events of a planning run, suitable for SSE.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type")]
pub enum PlanEvent {
    SearchStarted {
        groups: usize,
        items: usize,
        split_budget: usize,
    },
    CandidatesGenerated {
        count: usize,
        nodes_explored: u64,
        truncated: bool,
    },
    CandidatesValidated { valid: usize, discarded: usize },
    CandidateScored { index: usize, packages: u64 },
    Finished {
        best_packages: u64,
        best_index: Option<usize>,
    },
    Aborted { reason: String },
}

pub fn plan(input: &PlanInput, config: &PlannerConfig) -> Result<PlanReport, PlanError> {
    plan_with_progress(input, config, |_| {})
}

/// Runs a plan and reports each stage through `on_event`.
///
/// Infeasible inputs are not an error: the report then holds no best candidate.
pub fn plan_with_progress(
    input: &PlanInput,
    config: &PlannerConfig,
    mut on_event: impl FnMut(&PlanEvent),
) -> Result<PlanReport, PlanError> {
    validate_items(&input.items)?;
    input.zip_occurrences.validate_against(&input.items)?;

    let groups = input.facility.config_groups();
    let search = SolutionSearch::new(&groups, &input.items)
        .with_limits(config.limits)
        .parallel(config.parallel);
    let split_budget = search.split_budget();
    on_event(&PlanEvent::SearchStarted {
        groups: groups.len(),
        items: input.items.len(),
        split_budget,
    });

    let started = Instant::now();
    let outcome = match search.generate() {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, "candidate generation aborted");
            on_event(&PlanEvent::Aborted {
                reason: err.to_string(),
            });
            return Err(err.into());
        }
    };
    let generated = outcome.candidates.len();
    on_event(&PlanEvent::CandidatesGenerated {
        count: generated,
        nodes_explored: outcome.nodes_explored,
        truncated: outcome.truncated,
    });

    let valid = SolutionValidator::new(&groups, &input.items).retain_valid(outcome.candidates);
    let generation_ms = started.elapsed().as_millis() as u64;
    on_event(&PlanEvent::CandidatesValidated {
        valid: valid.len(),
        discarded: generated - valid.len(),
    });

    let started = Instant::now();
    let score = SolutionScorer::new(&input.zip_occurrences)
        .with_threshold(config.package_threshold)
        .parallel(config.parallel)
        .calculate_solutions(&valid);
    let scoring_ms = started.elapsed().as_millis() as u64;
    for (index, &packages) in score.scores.iter().enumerate() {
        on_event(&PlanEvent::CandidateScored { index, packages });
    }
    on_event(&PlanEvent::Finished {
        best_packages: score.best_packages,
        best_index: score.best_index,
    });

    info!(
        generated,
        valid = valid.len(),
        best_packages = score.best_packages,
        generation_ms,
        scoring_ms,
        "plan finished"
    );

    Ok(PlanReport {
        groups,
        split_budget,
        generated,
        valid: valid.len(),
        nodes_explored: outcome.nodes_explored,
        truncated: outcome.truncated,
        score,
        generation_ms,
        scoring_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::{Line, LineConfiguration};
    use std::sync::Arc;

    fn facility() -> Facility {
        Facility::new(
            vec![
                LineConfiguration::new(7, 2, 0, 100).unwrap(),
                LineConfiguration::new(3, 2, 0, 10).unwrap(),
            ],
            vec![Line { configuration: 7 }, Line { configuration: 3 }],
        )
        .unwrap()
    }

    fn occurrences() -> ZipOccurrences {
        let mut zips = ZipOccurrences::new();
        zips.extend_zip("Z1", std::iter::repeat_n(Arc::from("c"), 10));
        zips.extend_zip("Z2", std::iter::repeat_n(Arc::from("b"), 9));
        zips
    }

    fn items() -> Vec<Item> {
        vec![
            Item::new("a", 8).unwrap(),
            Item::new("b", 9).unwrap(),
            Item::new("c", 30).unwrap(),
        ]
    }

    #[test]
    fn plans_and_picks_best_candidate() {
        let input = PlanInput::new(facility(), items(), occurrences());
        let config = PlannerConfig::builder().package_threshold(9).build();

        let mut events = Vec::new();
        let report = plan_with_progress(&input, &config, |e| events.push(e.clone())).unwrap();

        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups[0].max_quantity_all_lines, 10);
        assert_eq!(report.split_budget, 1);
        assert_eq!(report.generated, 2);
        assert_eq!(report.valid, 2);
        assert_eq!(report.score.scores, vec![1, 2]);
        assert_eq!(report.score.best_index, Some(1));

        let best = report.score.best.unwrap();
        assert_eq!(best.allocations[0].quantity_of("c"), Some(2));
        assert_eq!(best.allocations[1].quantity_of("b"), Some(9));

        let kinds: Vec<String> = events
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "SearchStarted",
                "CandidatesGenerated",
                "CandidatesValidated",
                "CandidateScored",
                "CandidateScored",
                "Finished"
            ]
        );
    }

    #[test]
    fn default_threshold_scores_fewer_packages() {
        let input = PlanInput::new(facility(), items(), occurrences());
        let report = plan(&input, &PlannerConfig::default()).unwrap();
        assert_eq!(report.score.scores, vec![1, 1]);
        assert_eq!(report.score.best_index, Some(0));
    }

    #[test]
    fn infeasible_input_is_not_an_error() {
        let facility = Facility::new(
            vec![LineConfiguration::new(1, 1, 0, 5).unwrap()],
            vec![Line { configuration: 1 }],
        )
        .unwrap();
        let input = PlanInput::new(facility, items(), occurrences());

        let mut last = None;
        let report = plan_with_progress(&input, &PlannerConfig::default(), |e| last = Some(e.clone()))
            .unwrap();
        assert_eq!(report.valid, 0);
        assert!(report.score.best.is_none());
        assert_eq!(
            last,
            Some(PlanEvent::Finished {
                best_packages: 0,
                best_index: None
            })
        );
    }

    #[test]
    fn items_can_be_derived_from_occurrences() {
        let input = PlanInput::from_occurrences(facility(), occurrences());
        let ids: Vec<&str> = input.items.iter().map(|i| i.id.as_ref()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(input.items[0].quantity, 10);
    }

    #[test]
    fn rejects_occurrences_of_unknown_items() {
        let mut zips = occurrences();
        zips.push("Z3", Arc::from("ghost"));
        let input = PlanInput::new(facility(), items(), zips);
        assert!(matches!(
            plan(&input, &PlannerConfig::default()),
            Err(PlanError::Validation(ValidationError::UnknownOccurrenceItem { .. }))
        ));
    }

    #[test]
    fn builder_sets_limits() {
        let config = PlannerConfig::builder()
            .max_candidates(Some(3))
            .max_nodes(Some(1_000))
            .time_limit(Some(Duration::from_millis(250)))
            .parallel(false)
            .package_threshold(0)
            .build();
        assert_eq!(config.limits.max_candidates, Some(3));
        assert_eq!(config.limits.max_nodes, Some(1_000));
        assert_eq!(config.limits.time_limit, Some(Duration::from_millis(250)));
        assert!(!config.parallel);
        assert_eq!(config.package_threshold, 1);
    }
}
