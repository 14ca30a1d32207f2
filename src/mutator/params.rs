//! Depth-keyed action probabilities.
//!
//! A [`ProbabilityTable`] maps the mutator's current stack depth to a [`ProbabilityEntry`]:
//! one percentage per [`ActionKind`]. Depths between two entries are linearly interpolated,
//! depths outside the table use the nearest entry. The [`EvaluationMode`] decides how an entry
//! turns into the set of actions of one step.

use std::fmt;
use std::str::FromStr;

use enum_map::EnumMap;
use itertools::Itertools;
use rand::Rng;
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use super::{ActionKind, ActionSet};
use crate::error::ConfigError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, EnumString, EnumIter, Display, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum EvaluationMode {
    /// One draw in `[0, 100)` walks the kinds, subtracting each percentage; percentages are
    /// shares of a single pie and at most one action fires.
    Flat,
    /// One draw in `[0, 100)`; the first kind whose percentage exceeds it fires.
    Override,
    /// An independent draw per kind; every kind whose percentage exceeds its draw fires.
    #[default]
    Sequence,
}

/// Percentages for one stack depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbabilityEntry {
    stack_depth: usize,
    percentages: EnumMap<ActionKind, u32>,
}

impl ProbabilityEntry {
    pub fn new(stack_depth: usize, percentages: EnumMap<ActionKind, u32>) -> Self {
        ProbabilityEntry {
            stack_depth,
            percentages,
        }
    }

    /// Percentages in [`ActionKind`] order.
    pub fn from_array(stack_depth: usize, values: [u32; ActionKind::COUNT]) -> Self {
        Self::new(stack_depth, EnumMap::from_array(values))
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    pub fn get(&self, kind: ActionKind) -> u32 {
        self.percentages[kind]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (kind, value) in self.percentages.iter() {
            if *value > 100 {
                return Err(ConfigError::PercentageOutOfRange {
                    depth: self.stack_depth,
                    kind,
                    value: *value,
                });
            }
        }
        if self.percentages.values().all(|v| *v == 0) {
            return Err(ConfigError::NoActions {
                depth: self.stack_depth,
            });
        }
        Ok(())
    }

    /// Integer interpolation between two entries at `depth`, with `lower.stack_depth < depth < upper.stack_depth`.
    fn interpolate(lower: &Self, upper: &Self, depth: usize) -> Self {
        let (x0, x1, d) = (
            lower.stack_depth as i64,
            upper.stack_depth as i64,
            depth as i64,
        );
        let percentages = EnumMap::from_fn(|kind| {
            let (y0, y1) = (lower.get(kind) as i64, upper.get(kind) as i64);
            (y0 + (y1 - y0) * (d - x0) / (x1 - x0)) as u32
        });
        ProbabilityEntry::new(depth, percentages)
    }

    /// One draw. May come back empty.
    pub fn draw_once<R: Rng + ?Sized>(&self, mode: EvaluationMode, rng: &mut R) -> ActionSet {
        match mode {
            EvaluationMode::Flat => {
                let mut remaining = rng.random_range(0..100u32);
                for kind in ActionKind::iter() {
                    let p = self.get(kind);
                    if p > remaining {
                        return ActionSet::single(kind);
                    }
                    remaining -= p;
                }
                ActionSet::EMPTY
            }
            EvaluationMode::Override => {
                let value = rng.random_range(0..100u32);
                ActionKind::iter()
                    .find(|kind| self.get(*kind) > value)
                    .map(ActionSet::single)
                    .unwrap_or_default()
            }
            EvaluationMode::Sequence => ActionKind::iter()
                .filter(|kind| self.get(*kind) > rng.random_range(0..100u32))
                .collect(),
        }
    }

    /// Draw until at least one action fires. The entry must enable some action.
    pub fn draw<R: Rng + ?Sized>(&self, mode: EvaluationMode, rng: &mut R) -> ActionSet {
        debug_assert!(self.percentages.values().any(|v| *v > 0));
        loop {
            let actions = self.draw_once(mode, rng);
            if !actions.is_empty() {
                return actions;
            }
        }
    }
}

impl fmt::Display for ProbabilityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.stack_depth,
            self.percentages.values().join(",")
        )
    }
}

impl FromStr for ProbabilityEntry {
    type Err = ConfigError;

    /// `depth:call,return,newobj,putstatic,changestatic,erasestatic,putref,changeref,eraseref`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_error = |reason: String| ConfigError::Parse {
            entry: s.to_string(),
            reason,
        };
        let (depth, values) = s
            .split_once(':')
            .ok_or_else(|| parse_error("expected `depth:percentages`".into()))?;
        let stack_depth = depth
            .trim()
            .parse::<usize>()
            .map_err(|e| parse_error(format!("bad stack depth: {}", e)))?;
        let values = values
            .split(',')
            .map(|v| v.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| parse_error(format!("bad percentage: {}", e)))?;
        let values: [u32; ActionKind::COUNT] = values.try_into().map_err(|v: Vec<u32>| {
            parse_error(format!(
                "expected {} percentages, got {}",
                ActionKind::COUNT,
                v.len()
            ))
        })?;
        Ok(ProbabilityEntry::from_array(stack_depth, values))
    }
}

/// A list of entries as given in configuration, before it is checked into a table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbabilityEntries(Vec<ProbabilityEntry>);

impl ProbabilityEntries {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_vec(&self) -> Vec<ProbabilityEntry> {
        self.0.clone()
    }

    /// Check the entries the way [`ProbabilityTable::new`] would. An empty list is valid
    /// here and means the built-in table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Ok(());
        }
        ProbabilityTable::new(EvaluationMode::default(), self.to_vec()).map(|_| ())
    }
}

impl FromStr for ProbabilityEntries {
    type Err = ConfigError;

    /// Entries separated by `;`. Blank entries are skipped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(';')
            .filter(|e| !e.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(ProbabilityEntries)
    }
}

impl fmt::Display for ProbabilityEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(";"))
    }
}

/// Validated, depth-sorted probability entries plus the mode they are evaluated in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbabilityTable {
    mode: EvaluationMode,
    entries: Vec<ProbabilityEntry>,
}

impl ProbabilityTable {
    pub fn new(mode: EvaluationMode, mut entries: Vec<ProbabilityEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        entries.sort_by_key(|e| e.stack_depth);
        if let Some((a, _)) = entries
            .iter()
            .tuple_windows()
            .find(|(a, b)| a.stack_depth == b.stack_depth)
        {
            return Err(ConfigError::DuplicateDepth {
                depth: a.stack_depth,
            });
        }
        for entry in &entries {
            entry.validate()?;
        }
        Ok(ProbabilityTable { mode, entries })
    }

    /// The built-in table for a mode.
    ///
    /// The `Sequence` table walks the stack: calls are certain at the root and impossible at
    /// depth 100, returns the other way round. The `Flat` table shares one pie between all
    /// kinds and leaves a tenth of the draws empty at the root.
    pub fn preset(mode: EvaluationMode) -> Self {
        let entries = match mode {
            EvaluationMode::Sequence => vec![
                ProbabilityEntry::from_array(0, [100, 0, 75, 10, 10, 10, 50, 50, 50]),
                ProbabilityEntry::from_array(100, [0, 100, 75, 10, 10, 10, 50, 50, 50]),
            ],
            EvaluationMode::Flat => vec![
                ProbabilityEntry::from_array(0, [20, 0, 20, 10, 10, 10, 10, 10, 10]),
                ProbabilityEntry::from_array(100, [10, 10, 20, 10, 10, 10, 10, 10, 10]),
            ],
            // Override shadows every kind whose percentage is not above the ones before it, so
            // the thresholds climb in priority order. Return overtakes Call around depth 57.
            EvaluationMode::Override => vec![
                ProbabilityEntry::from_array(0, [10, 0, 30, 40, 50, 60, 75, 90, 100]),
                ProbabilityEntry::from_array(100, [5, 25, 40, 50, 60, 70, 80, 90, 100]),
            ],
        };
        ProbabilityTable { mode, entries }
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn entries(&self) -> &[ProbabilityEntry] {
        &self.entries
    }

    /// The effective entry for a stack depth.
    pub fn entry_for(&self, depth: usize) -> ProbabilityEntry {
        match self
            .entries
            .binary_search_by_key(&depth, |e| e.stack_depth)
        {
            Ok(index) => self.entries[index].clone(),
            Err(0) => self.entries[0].clone(),
            Err(index) if index == self.entries.len() => self.entries[index - 1].clone(),
            Err(index) => {
                ProbabilityEntry::interpolate(&self.entries[index - 1], &self.entries[index], depth)
            }
        }
    }

    /// Draw the actions for one step at `depth`.
    pub fn draw<R: Rng + ?Sized>(&self, depth: usize, rng: &mut R) -> ActionSet {
        self.entry_for(depth).draw(self.mode, rng)
    }
}

impl fmt::Display for ProbabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.mode, self.entries.iter().join("; "))
    }
}
