//! Per-team histograms of the furthest stage reached across samples.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::WcResult;
use crate::stage::Stage;

/// Count per stage for one team, indexed by [`Stage::ordinal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts(pub [u64; Stage::COUNT]);

impl StageCounts {
    pub fn get(&self, stage: Stage) -> u64 {
        self.0[stage.ordinal()]
    }

    pub fn increment(&mut self, stage: Stage) {
        self.0[stage.ordinal()] += 1;
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn add(&mut self, other: &StageCounts) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += theirs;
        }
    }

    /// Most frequent stage; ties go to the earlier stage. `None` when empty.
    pub fn modal_stage(&self) -> Option<Stage> {
        if self.total() == 0 {
            return None;
        }
        let mut best = Stage::Group;
        for stage in Stage::ALL {
            if self.get(stage) > self.get(best) {
                best = stage;
            }
        }
        Some(best)
    }

    /// Mean ordinal stage across samples. `None` when empty.
    pub fn expected_ordinal(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let weighted: u64 = Stage::ALL
            .iter()
            .map(|s| s.ordinal() as u64 * self.get(*s))
            .sum();
        Some(weighted as f64 / total as f64)
    }
}

/// Mapping from team name to its stage histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCountTable {
    rows: BTreeMap<String, StageCounts>,
}

impl StageCountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with an all-zero row for every team.
    pub fn with_teams<I, S>(teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: teams
                .into_iter()
                .map(|t| (t.into(), StageCounts::default()))
                .collect(),
        }
    }

    pub fn record(&mut self, team: &str, stage: Stage) {
        self.rows.entry(team.to_string()).or_default().increment(stage);
    }

    pub fn insert_row(&mut self, team: impl Into<String>, counts: StageCounts) {
        self.rows.insert(team.into(), counts);
    }

    pub fn get(&self, team: &str) -> Option<&StageCounts> {
        self.rows.get(team)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&String, &StageCounts)> {
        self.rows.iter()
    }

    pub fn teams(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum counts per (team, stage) from `other` into `self`.
    pub fn merge(&mut self, other: &StageCountTable) {
        for (team, counts) in &other.rows {
            self.rows.entry(team.clone()).or_default().add(counts);
        }
    }

    /// Reduce any number of tables into one. Order of `tables` is irrelevant.
    pub fn merge_all<'a, I>(tables: I) -> Self
    where
        I: IntoIterator<Item = &'a StageCountTable>,
    {
        let mut merged = Self::new();
        for table in tables {
            merged.merge(table);
        }
        merged
    }

    /// Number of samples the table represents, checking that every row
    /// agrees. Empty tables and all-zero tables report zero.
    pub fn sample_count(&self) -> WcResult<u64> {
        let mut totals = self.rows.iter().map(|(team, c)| (team, c.total()));
        let Some((_, expected)) = totals.next() else {
            return Ok(0);
        };
        for (team, total) in totals {
            if total != expected {
                return Err(crate::validation_error!(
                    "row for {team} sums to {total}, expected {expected}"
                ));
            }
        }
        Ok(expected)
    }

    /// Teams ordered by descending `Winner` count, then name.
    pub fn ranked_by_wins(&self) -> Vec<(&String, &StageCounts)> {
        let mut ranked: Vec<_> = self.rows.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.get(Stage::Winner)
                .cmp(&a.1.get(Stage::Winner))
                .then_with(|| a.0.cmp(b.0))
        });
        ranked
    }
}
