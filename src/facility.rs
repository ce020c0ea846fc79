//! Facility layout: line configurations, physical lines and the merged configuration groups
//! the search runs over.

use std::collections::{HashMap, HashSet};

use crate::model::ValidationError;
use crate::types::Quantity;

/// Configuration record shared by one or more physical lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineConfiguration {
    pub id: u32,
    pub pockets: usize,
    pub min_quantity_per_line: Quantity,
    pub max_quantity_all_lines: Quantity,
}

impl LineConfiguration {
    /// Creates a configuration after validating its bounds.
    pub fn new(
        id: u32,
        pockets: usize,
        min_quantity_per_line: Quantity,
        max_quantity_all_lines: Quantity,
    ) -> Result<Self, ValidationError> {
        if pockets == 0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "configuration {} must have at least one pocket",
                id
            )));
        }
        if min_quantity_per_line > max_quantity_all_lines {
            return Err(ValidationError::InvalidConfiguration(format!(
                "configuration {}: minimum per line ({}) exceeds maximum for all lines ({})",
                id, min_quantity_per_line, max_quantity_all_lines
            )));
        }
        Ok(Self {
            id,
            pockets,
            min_quantity_per_line,
            max_quantity_all_lines,
        })
    }
}

/// A physical line, governed by a configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Line {
    pub configuration: u32,
}

/// A co-mail facility: its configurations and the lines using them.
#[derive(Clone, Debug)]
pub struct Facility {
    configurations: Vec<LineConfiguration>,
    lines: Vec<Line>,
}

impl Facility {
    /// Creates a facility, checking that configuration ids are unique and that every line
    /// references a known configuration.
    pub fn new(
        configurations: Vec<LineConfiguration>,
        lines: Vec<Line>,
    ) -> Result<Self, ValidationError> {
        let mut ids = HashSet::with_capacity(configurations.len());
        for cfg in &configurations {
            if !ids.insert(cfg.id) {
                return Err(ValidationError::DuplicateConfiguration(cfg.id));
            }
        }
        for (idx, line) in lines.iter().enumerate() {
            if !ids.contains(&line.configuration) {
                return Err(ValidationError::UnknownConfiguration {
                    line: idx,
                    configuration: line.configuration,
                });
            }
        }
        Ok(Self {
            configurations,
            lines,
        })
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn configurations(&self) -> &[LineConfiguration] {
        &self.configurations
    }

    /// Collapses lines sharing a configuration into configuration groups.
    ///
    /// Groups are ordered ascending by `(pockets, max_quantity_all_lines)`; ties keep the order
    /// in which their configuration was first used by a line.
    pub fn config_groups(&self) -> Vec<ConfigGroup> {
        let by_id: HashMap<u32, &LineConfiguration> =
            self.configurations.iter().map(|c| (c.id, c)).collect();

        let mut groups: Vec<ConfigGroup> = Vec::new();
        let mut slot_of: HashMap<u32, usize> = HashMap::new();
        for line in &self.lines {
            let Some(cfg) = by_id.get(&line.configuration) else {
                continue;
            };
            match slot_of.get(&cfg.id) {
                Some(&idx) => groups[idx].size += 1,
                None => {
                    slot_of.insert(cfg.id, groups.len());
                    groups.push(ConfigGroup::from_configuration(cfg));
                }
            }
        }

        groups.sort_by_key(|g| (g.pockets, g.max_quantity_all_lines));
        groups
    }
}

/// One or more physical lines sharing identical bounds.
///
/// `size` lines each offer `pockets` slots, so a group can fill between `pockets` and
/// `pockets * size` slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigGroup {
    pub pockets: usize,
    pub min_quantity_per_line: Quantity,
    pub max_quantity_all_lines: Quantity,
    pub size: usize,
}

impl ConfigGroup {
    fn from_configuration(cfg: &LineConfiguration) -> Self {
        Self {
            pockets: cfg.pockets,
            min_quantity_per_line: cfg.min_quantity_per_line,
            max_quantity_all_lines: cfg.max_quantity_all_lines,
            size: 1,
        }
    }

    /// Total slot capacity of the group.
    #[inline]
    pub fn slot_capacity(&self) -> usize {
        self.pockets * self.size
    }

    /// Slot counts the group may fill.
    #[inline]
    pub fn slot_range(&self) -> std::ops::RangeInclusive<usize> {
        self.pockets..=self.slot_capacity()
    }

    /// Checks a consumed total against the group's bounds.
    ///
    /// The per-line minimum is compared with the whole group's total: the search keeps a single
    /// allocation per group, not one per physical line.
    #[inline]
    pub fn accepts_total(&self, total: Quantity) -> bool {
        self.min_quantity_per_line <= total && total <= self.max_quantity_all_lines
    }
}

/// Total slot capacity of a sequence of groups.
pub fn slot_capacity(groups: &[ConfigGroup]) -> usize {
    groups.iter().map(ConfigGroup::slot_capacity).sum()
}

/// Sum of the group maxima of a sequence of groups.
pub fn max_quantity(groups: &[ConfigGroup]) -> Quantity {
    groups.iter().map(|g| g.max_quantity_all_lines).sum()
}
