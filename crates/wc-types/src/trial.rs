//! Descriptors for the units of work handed to workers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tournament::TournamentYear;

/// Hyperparameters evaluated by one calibration trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Exponential time-decay rate, per year.
    pub epsilon: f64,
    /// Multiplier applied to World Cup finals matches.
    pub world_cup_weight: f64,
}

impl CalibrationParams {
    pub fn new(epsilon: f64, world_cup_weight: f64) -> Self {
        Self {
            epsilon,
            world_cup_weight,
        }
    }

    /// Neutral baseline: no time decay, no World Cup up-weighting.
    pub fn neutral() -> Self {
        Self::new(0.0, 1.0)
    }

    /// `{timestamp}_epsilon_{e}_worldcupweight_{w}`
    pub fn file_stem(&self, timestamp: i64) -> String {
        format!(
            "{timestamp}_epsilon_{}_worldcupweight_{}",
            format_float(self.epsilon),
            format_float(self.world_cup_weight)
        )
    }
}

impl fmt::Display for CalibrationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epsilon={} world_cup_weight={}",
            format_float(self.epsilon),
            format_float(self.world_cup_weight)
        )
    }
}

/// One batch of tournament samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationBatch {
    pub batch_index: usize,
    pub tournament_year: TournamentYear,
    pub sample_count: usize,
    pub resume_from: Option<NaiveDate>,
    pub seed: Option<u64>,
}

impl SimulationBatch {
    /// Seed for this batch, derived from the run seed so batches differ.
    pub fn batch_seed(&self) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(self.batch_index as u64))
    }
}

/// An immutable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrialDescriptor {
    Calibration(CalibrationParams),
    Simulation(SimulationBatch),
}

impl TrialDescriptor {
    /// Identifier used in logs and output names.
    pub fn label(&self) -> String {
        match self {
            TrialDescriptor::Calibration(p) => format!(
                "epsilon_{}_worldcupweight_{}",
                format_float(p.epsilon),
                format_float(p.world_cup_weight)
            ),
            TrialDescriptor::Simulation(b) => format!(
                "{}_batch_{}_samples_{}",
                b.tournament_year, b.batch_index, b.sample_count
            ),
        }
    }
}

impl fmt::Display for TrialDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Held-out likelihoods of one calibration trial, one value per evaluation
/// window, in window order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodRow {
    pub params: CalibrationParams,
    pub metrics: Vec<(String, f64)>,
}

impl LikelihoodRow {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// `epsilon,world_cup_weight,<metric names...>`
    pub fn header(&self) -> String {
        let mut columns = vec!["epsilon".to_string(), "world_cup_weight".to_string()];
        columns.extend(self.metrics.iter().map(|(n, _)| n.clone()));
        columns.join(",")
    }

    /// Data row; metric values carry six decimals.
    pub fn values(&self) -> String {
        let mut values = vec![
            format_float(self.params.epsilon),
            format_float(self.params.world_cup_weight),
        ];
        values.extend(self.metrics.iter().map(|(_, v)| format!("{v:.6}")));
        values.join(",")
    }
}

/// Render a float with a mandatory decimal point: `0.0`, `0.1`, `2.5`.
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_keeps_decimal_point() {
        let p = CalibrationParams::new(0.0, 1.0);
        assert_eq!(p.file_stem(1700000000), "1700000000_epsilon_0.0_worldcupweight_1.0");
        let p = CalibrationParams::new(0.1, 2.5);
        assert_eq!(p.file_stem(1), "1_epsilon_0.1_worldcupweight_2.5");
    }

    #[test]
    fn labels_are_unique_per_grid_point() {
        let a = TrialDescriptor::Calibration(CalibrationParams::new(0.0, 1.0));
        let b = TrialDescriptor::Calibration(CalibrationParams::new(0.1, 1.0));
        assert_ne!(a.label(), b.label());
    }

    #[test]
    fn likelihood_row_layout() {
        let row = LikelihoodRow {
            params: CalibrationParams::new(0.2, 1.5),
            metrics: vec![
                ("likelihood_W_to_F".to_string(), -1234.5),
                ("likelihood_W_to_C1".to_string(), -10.0),
            ],
        };
        assert_eq!(row.header(), "epsilon,world_cup_weight,likelihood_W_to_F,likelihood_W_to_C1");
        assert_eq!(row.values(), "0.2,1.5,-1234.500000,-10.000000");
        assert_eq!(row.metric("likelihood_W_to_C1"), Some(-10.0));
    }

    #[test]
    fn batch_seeds_differ() {
        let batch = |i| SimulationBatch {
            batch_index: i,
            tournament_year: TournamentYear::Y2018,
            sample_count: 10,
            resume_from: None,
            seed: Some(42),
        };
        assert_eq!(batch(0).batch_seed(), Some(42));
        assert_eq!(batch(3).batch_seed(), Some(45));
        assert_eq!(
            TrialDescriptor::Simulation(batch(3)).to_string(),
            "2018_batch_3_samples_10"
        );
    }
}
