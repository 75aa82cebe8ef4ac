//! Hyperparameter grids for the likelihood scan.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wc_types::{config_error, CalibrationParams, ScanConfig, WcResult};

pub const EPSILON: &str = "epsilon";
pub const WORLD_CUP_WEIGHT: &str = "world_cup_weight";

/// One swept parameter and the values it takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<f64>,
}

/// The full search space: an ordered list of axes. Earlier axes vary
/// slowest in the grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub axes: Vec<Axis>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.push(Axis {
            name: name.into(),
            values,
        });
        self
    }

    /// `epsilon x world_cup_weight`, as listed in the scan configuration.
    pub fn from_scan(config: &ScanConfig) -> Self {
        Self::new()
            .add_axis(EPSILON, config.epsilons.clone())
            .add_axis(WORLD_CUP_WEIGHT, config.world_cup_weights.clone())
    }

    pub fn grid_size(&self) -> usize {
        self.axes.iter().map(|a| a.values.len()).product()
    }
}

/// Every combination of the search space, first axis slowest.
#[derive(Debug, Clone)]
pub struct GridSearch {
    combos: Vec<CalibrationParams>,
}

impl GridSearch {
    pub fn new(space: &SearchSpace) -> WcResult<Self> {
        let combos = Self::build_grid(space)
            .iter()
            .map(to_params)
            .collect::<WcResult<Vec<_>>>()?;
        Ok(Self { combos })
    }

    fn build_grid(space: &SearchSpace) -> Vec<BTreeMap<String, f64>> {
        // Cartesian product
        let mut result: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new()];
        for axis in &space.axes {
            let mut next = Vec::with_capacity(result.len() * axis.values.len());
            for existing in &result {
                for value in &axis.values {
                    let mut combo = existing.clone();
                    combo.insert(axis.name.clone(), *value);
                    next.push(combo);
                }
            }
            result = next;
        }
        result
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    pub fn all(&self) -> &[CalibrationParams] {
        &self.combos
    }
}

fn to_params(combo: &BTreeMap<String, f64>) -> WcResult<CalibrationParams> {
    let get = |name: &str| {
        combo
            .get(name)
            .copied()
            .ok_or_else(|| config_error!("search space has no '{name}' axis"))
    };
    Ok(CalibrationParams::new(get(EPSILON)?, get(WORLD_CUP_WEIGHT)?))
}
