//! Trial tracking and scan run management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;
use wc_types::{CalibrationParams, LikelihoodRow, TrialDescriptor};

/// Unique scan run identifier.
pub type ScanId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

/// Lifecycle state for a scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of a scan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub id: ScanId,
    /// Likelihood column ranking the trials.
    pub objective_metric: String,
    pub direction: ObjectiveDirection,
    pub state: ScanState,
    pub trials_completed: usize,
    pub trials_failed: usize,
    pub best_trial: Option<TrialResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ScanStatus {
    pub fn new(objective_metric: impl Into<String>, direction: ObjectiveDirection) -> Self {
        Self {
            id: Uuid::new_v4(),
            objective_metric: objective_metric.into(),
            direction,
            state: ScanState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            best_trial: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = ScanState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = ScanState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = ScanState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Update the best trial if `result` improves on the current best.
    /// Results without the objective column are ignored.
    pub fn update_best(&mut self, result: &TrialResult) {
        let Some(objective) = result.objective(&self.objective_metric) else {
            return;
        };
        let dominated = match self
            .best_trial
            .as_ref()
            .and_then(|best| best.objective(&self.objective_metric))
        {
            None => true,
            Some(best) => match self.direction {
                ObjectiveDirection::Maximize => objective > best,
                ObjectiveDirection::Minimize => objective < best,
            },
        };
        if dominated {
            self.best_trial = Some(result.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

/// One grid point and its dispatch history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub scan_id: ScanId,
    pub trial_number: usize,
    pub params: CalibrationParams,
    pub status: TrialStatus,
    /// Times a worker has picked this trial up.
    pub attempts: usize,
    pub result: Option<TrialResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker_id: Option<usize>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(scan_id: ScanId, trial_number: usize, params: CalibrationParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_id,
            trial_number,
            params,
            status: TrialStatus::Pending,
            attempts: 0,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            worker_id: None,
            error: None,
        }
    }

    pub fn descriptor(&self) -> TrialDescriptor {
        TrialDescriptor::Calibration(self.params)
    }

    pub fn mark_running(&mut self, worker_id: usize) {
        self.status = TrialStatus::Running;
        self.attempts += 1;
        self.started_at = Some(Utc::now());
        self.worker_id = Some(worker_id);
    }

    pub fn mark_completed(&mut self, result: TrialResult) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.error = None;
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Put a failed trial back in line for another attempt.
    pub fn mark_requeued(&mut self) {
        self.status = TrialStatus::Pending;
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, TrialStatus::Completed | TrialStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// What a worker produced for one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutput {
    pub row: LikelihoodRow,
    pub model_path: PathBuf,
    pub results_path: PathBuf,
}

/// Result of a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub row: LikelihoodRow,
    pub model_path: PathBuf,
    pub results_path: PathBuf,
    pub duration_seconds: Option<u64>,
}

impl TrialResult {
    pub fn objective(&self, metric: &str) -> Option<f64> {
        self.row.metric(metric)
    }
}

/// What the ledger wants done with a failed trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    GiveUp,
}

/// Every trial of a scan, by index. A scan is settled once each trial has
/// completed or used up its attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialLedger {
    pub scan_id: ScanId,
    pub max_attempts: usize,
    trials: Vec<Trial>,
}

impl TrialLedger {
    pub fn new(scan_id: ScanId, params: &[CalibrationParams], max_attempts: usize) -> Self {
        let trials = params
            .iter()
            .enumerate()
            .map(|(i, p)| Trial::new(scan_id, i, *p))
            .collect();
        Self {
            scan_id,
            max_attempts: max_attempts.max(1),
            trials,
        }
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn get(&self, index: usize) -> Option<&Trial> {
        self.trials.get(index)
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn start(&mut self, index: usize, worker_id: usize) {
        if let Some(trial) = self.trials.get_mut(index) {
            trial.mark_running(worker_id);
        }
    }

    /// Record a finished trial. Returns the stored result.
    pub fn complete(&mut self, index: usize, output: TrialOutput) -> Option<&TrialResult> {
        let trial = self.trials.get_mut(index)?;
        let duration_seconds = trial
            .started_at
            .map(|t| (Utc::now() - t).num_seconds().max(0) as u64);
        trial.mark_completed(TrialResult {
            trial_id: trial.id,
            row: output.row,
            model_path: output.model_path,
            results_path: output.results_path,
            duration_seconds,
        });
        trial.result.as_ref()
    }

    /// Record a failed attempt. Trials below `max_attempts` go back to
    /// pending.
    pub fn fail(&mut self, index: usize, error: String) -> RetryDecision {
        let max_attempts = self.max_attempts;
        let Some(trial) = self.trials.get_mut(index) else {
            return RetryDecision::GiveUp;
        };
        trial.mark_failed(error);
        if trial.attempts < max_attempts {
            trial.mark_requeued();
            RetryDecision::Retry
        } else {
            RetryDecision::GiveUp
        }
    }

    pub fn is_settled(&self) -> bool {
        self.trials.iter().all(Trial::is_finished)
    }

    pub fn completed(&self) -> impl Iterator<Item = &TrialResult> {
        self.trials.iter().filter_map(|t| t.result.as_ref())
    }

    pub fn completed_count(&self) -> usize {
        self.completed().count()
    }

    /// Grid points without a result: failed for good, or never settled.
    pub fn missing(&self) -> Vec<&Trial> {
        self.trials
            .iter()
            .filter(|t| t.status != TrialStatus::Completed)
            .collect()
    }
}
