//! Calibration trials and the likelihood scan built from them.

use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use wc_data::{ArtifactStore, DataLoader, DataPaths, ResultFilter};
use wc_types::{
    CalibrationParams, FitSettings, HistoricalMatch, LikelihoodRow, MatchWeighting, ModelFitter,
    ScanConfig, TrialError, WcResult, COMPETITIONS,
};

use crate::distributor::{TrialExecutor, WorkDistributor};
use crate::likelihood::{default_windows, CoverageWindow};
use crate::search::{GridSearch, SearchSpace};
use crate::trial::{ObjectiveDirection, ScanStatus, TrialOutput, TrialResult};

/// Fits one model per grid point and scores it on the test period.
pub struct CalibrationRunner<F: ModelFitter> {
    fitter: F,
    config: ScanConfig,
    training: Vec<HistoricalMatch>,
    test: Vec<HistoricalMatch>,
    windows: Vec<CoverageWindow>,
    store: ArtifactStore,
}

impl<F: ModelFitter> CalibrationRunner<F> {
    pub fn new(
        fitter: F,
        config: ScanConfig,
        training: Vec<HistoricalMatch>,
        test: Vec<HistoricalMatch>,
    ) -> WcResult<Self> {
        let store = ArtifactStore::new(&config.output_dir)?;
        Ok(Self {
            fitter,
            config,
            training,
            test,
            windows: default_windows(),
            store,
        })
    }

    /// Read training and test matches from `results.csv`. Training keeps the
    /// configured competitions; test keeps every competition so each window
    /// can pick its own.
    pub fn load(paths: &DataPaths, config: ScanConfig, fitter: F) -> WcResult<Self> {
        let loader = DataLoader::new();
        let training = loader.load_results(
            paths.results(),
            &ResultFilter::new(config.train, &config.competitions),
        )?;
        let all: Vec<String> = COMPETITIONS.iter().map(|c| c.to_string()).collect();
        let test = loader.load_results(paths.results(), &ResultFilter::new(config.test, &all))?;
        info!(
            "Loaded {} training matches ({} to {}) and {} test matches ({} to {})",
            training.len(),
            config.train.start,
            config.train.end,
            test.len(),
            config.test.start,
            config.test.end
        );
        Self::new(fitter, config, training, test)
    }

    /// Fit, score every window, and write the model and results files.
    pub fn run_trial(&self, params: &CalibrationParams) -> WcResult<TrialOutput> {
        let reference = self.config.train.end;
        let settings = FitSettings {
            weighting: MatchWeighting::new(*params, reference),
            host: None,
            ratings_source: self.config.ratings_source,
        };
        let model = self
            .fitter
            .fit(&self.training, &settings)
            .map_err(|e| TrialError::FitFailed {
                message: format!("{params}: {e}"),
            })?;

        let test_weighting = if self.config.test_with_weights {
            settings.weighting
        } else {
            MatchWeighting::neutral(reference)
        };
        let metrics = self
            .windows
            .iter()
            .map(|w| (w.name.clone(), w.log_likelihood(&model, &self.test, &test_weighting)))
            .collect();
        let row = LikelihoodRow {
            params: *params,
            metrics,
        };
        self.write(params, &model, row)
    }

    fn write<M: Serialize>(
        &self,
        params: &CalibrationParams,
        model: &M,
        row: LikelihoodRow,
    ) -> WcResult<TrialOutput> {
        let stem = params.file_stem(Utc::now().timestamp());
        let model_path = self.store.write_model(&stem, model)?;
        let results_path = self.store.write_likelihood_row(&stem, &row)?;
        Ok(TrialOutput {
            row,
            model_path,
            results_path,
        })
    }
}

impl<F: ModelFitter> TrialExecutor for CalibrationRunner<F> {
    fn execute(&self, params: &CalibrationParams, worker_id: usize) -> WcResult<TrialOutput> {
        info!("Worker {} running {}", worker_id, params);
        let output = self.run_trial(params)?;
        info!("Worker {} wrote {}", worker_id, output.results_path.display());
        Ok(output)
    }
}

/// Outcome of a whole scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub output_dir: PathBuf,
    /// Completed rows in grid order.
    pub rows: Vec<LikelihoodRow>,
    pub missing: Vec<CalibrationParams>,
    pub status: ScanStatus,
    pub queue_entries: usize,
    pub workers_exited: usize,
    pub elapsed: Duration,
}

impl ScanReport {
    pub fn best(&self) -> Option<&TrialResult> {
        self.status.best_trial.as_ref()
    }
}

/// Grid search over `epsilon x world_cup_weight` on a worker pool.
pub struct LikelihoodScan {
    config: ScanConfig,
}

impl LikelihoodScan {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Load the data, then run every grid point.
    pub fn run<F: ModelFitter>(&self, paths: &DataPaths, fitter: F) -> WcResult<ScanReport> {
        let runner = CalibrationRunner::load(paths, self.config.clone(), fitter)?;
        self.run_with(&runner)
    }

    /// Run every grid point through `executor`.
    pub fn run_with<E: TrialExecutor>(&self, executor: &E) -> WcResult<ScanReport> {
        self.config.validate()?;
        let grid = GridSearch::new(&SearchSpace::from_scan(&self.config))?;
        info!(
            "Scanning {} grid points ({} epsilons x {} world cup weights) on {} threads",
            grid.len(),
            self.config.epsilons.len(),
            self.config.world_cup_weights.len(),
            self.config.num_thread
        );

        let objective = default_windows()
            .first()
            .map(|w| w.name.clone())
            .unwrap_or_default();
        let report = WorkDistributor::new(self.config.num_thread)
            .with_max_attempts(self.config.max_attempts)
            .with_objective(&objective, ObjectiveDirection::Maximize)
            .run(grid.all(), executor)?;

        let rows = report
            .ledger
            .trials()
            .iter()
            .filter_map(|t| t.result.as_ref().map(|r| r.row.clone()))
            .collect();
        let missing: Vec<CalibrationParams> =
            report.ledger.missing().iter().map(|t| t.params).collect();
        if !missing.is_empty() {
            warn!("{} grid points produced no results", missing.len());
        }
        if let Some(best) = &report.status.best_trial {
            info!(
                "Best {}: {} ({:.6})",
                objective,
                best.row.params,
                best.objective(&objective).unwrap_or(f64::NAN)
            );
        }
        info!(
            "Scan finished in {:.1}s ({} queue entries)",
            report.elapsed.as_secs_f64(),
            report.queue_entries
        );

        Ok(ScanReport {
            output_dir: self.config.output_dir.clone(),
            rows,
            missing,
            status: report.status,
            queue_entries: report.queue_entries,
            workers_exited: report.workers_exited,
            elapsed: report.elapsed,
        })
    }
}
