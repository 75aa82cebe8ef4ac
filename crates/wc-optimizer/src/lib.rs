//! # wc-optimizer
//!
//! Hyperparameter calibration for the World Cup predictor.
//!
//! Sweeps the time-decay rate and World Cup weight over a grid, fits one
//! model per grid point on a worker pool, and scores each fit by held-out
//! log-likelihood.

mod calibration;
mod distributor;
mod likelihood;
mod search;
mod trial;

pub use calibration::{CalibrationRunner, LikelihoodScan, ScanReport};
pub use distributor::{DistributionReport, TrialExecutor, WorkDistributor, WorkItem};
pub use likelihood::{default_windows, match_log_likelihood, CoverageWindow, MIN_PROBABILITY};
pub use search::{Axis, GridSearch, SearchSpace, EPSILON, WORLD_CUP_WEIGHT};
pub use trial::{
    ObjectiveDirection, RetryDecision, ScanId, ScanState, ScanStatus, Trial, TrialLedger,
    TrialOutput, TrialResult, TrialStatus,
};
