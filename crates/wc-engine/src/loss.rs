//! Ordinal loss between predicted and actual furthest stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use wc_types::{validation_error, DataError, Stage, StageCountTable, WcResult};

/// Aggregate loss of a merged run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossSummary {
    /// Sum over teams of the distance between modal and actual stage.
    pub modal_stage_loss: u32,
    /// Sum over teams of the distance between mean ordinal and actual stage.
    pub expected_stage_loss: f64,
    pub samples: u64,
}

impl fmt::Display for LossSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "modal_stage_loss: {}", self.modal_stage_loss)?;
        writeln!(f, "expected_stage_loss: {:.6}", self.expected_stage_loss)?;
        writeln!(f, "samples: {}", self.samples)
    }
}

/// Scores predictions against a completed tournament.
#[derive(Debug, Clone, PartialEq)]
pub struct LossEvaluator {
    actual: BTreeMap<String, Stage>,
}

impl LossEvaluator {
    pub fn new(actual: BTreeMap<String, Stage>) -> Self {
        Self { actual }
    }

    pub fn actual(&self) -> &BTreeMap<String, Stage> {
        &self.actual
    }

    fn actual_stage(&self, team: &str) -> WcResult<Stage> {
        self.actual.get(team).copied().ok_or_else(|| {
            DataError::MissingActual {
                team: team.to_string(),
            }
            .into()
        })
    }

    fn check_coverage<'a>(&self, mut predicted: impl Iterator<Item = &'a String>) -> WcResult<()> {
        let mut seen = 0;
        predicted.try_for_each(|team| {
            seen += 1;
            self.actual_stage(team).map(|_| ())
        })?;
        if seen != self.actual.len() {
            return Err(validation_error!(
                "prediction covers {seen} teams, actual result has {}",
                self.actual.len()
            ));
        }
        Ok(())
    }

    /// Summed ordinal distance of one predicted stage per team.
    pub fn stage_loss(&self, predicted: &BTreeMap<String, Stage>) -> WcResult<u32> {
        self.check_coverage(predicted.keys())?;
        predicted
            .iter()
            .map(|(team, stage)| -> WcResult<u32> { Ok(stage.distance(self.actual_stage(team)?)) })
            .sum()
    }

    /// Loss of a merged table through each team's modal and expected stage.
    pub fn table_loss(&self, table: &StageCountTable) -> WcResult<LossSummary> {
        self.check_coverage(table.teams())?;
        let samples = table.sample_count()?;

        let mut modal_stage_loss = 0;
        let mut expected_stage_loss = 0.0;
        for (team, counts) in table.rows() {
            let actual = self.actual_stage(team)?;
            let (Some(modal), Some(expected)) = (counts.modal_stage(), counts.expected_ordinal())
            else {
                return Err(validation_error!("no samples recorded for {team}"));
            };
            modal_stage_loss += modal.distance(actual);
            expected_stage_loss += (expected - actual.ordinal() as f64).abs();
        }

        Ok(LossSummary {
            modal_stage_loss,
            expected_stage_loss,
            samples,
        })
    }
}
