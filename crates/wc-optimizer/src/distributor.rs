//! Work queue feeding calibration trials to a fixed pool of worker threads.
//!
//! The coordinator enqueues one [`WorkItem::Trial`] per grid point, then
//! listens for worker events and re-enqueues failed trials while they have
//! attempts left. Once every trial is settled it sends one
//! [`WorkItem::Stop`] per worker and drops the sender, so a worker exits on
//! whichever it sees first.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wc_types::{internal_error, CalibrationParams, TrialDescriptor, TrialError, WcResult};

use crate::trial::{ObjectiveDirection, RetryDecision, ScanStatus, TrialLedger, TrialOutput};

/// Runs one grid point. Shared by every worker thread.
pub trait TrialExecutor: Sync {
    fn execute(&self, params: &CalibrationParams, worker_id: usize) -> WcResult<TrialOutput>;
}

/// An entry in the work queue.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    Trial {
        index: usize,
        params: CalibrationParams,
    },
    Stop,
}

#[derive(Debug)]
enum WorkerEvent {
    Started {
        worker_id: usize,
        index: usize,
    },
    Finished {
        worker_id: usize,
        index: usize,
        outcome: Result<TrialOutput, String>,
    },
    Exited {
        worker_id: usize,
        trials: usize,
    },
}

/// What happened during one distribution run.
#[derive(Debug, Clone)]
pub struct DistributionReport {
    pub ledger: TrialLedger,
    pub status: ScanStatus,
    /// Every entry ever placed on the queue, trials and stops.
    pub queue_entries: usize,
    /// Trial entries, retries included.
    pub trial_entries: usize,
    pub stop_entries: usize,
    pub workers_exited: usize,
    pub elapsed: Duration,
}

/// Fixed-size worker pool over a shared queue.
#[derive(Debug, Clone)]
pub struct WorkDistributor {
    num_workers: usize,
    max_attempts: usize,
    objective_metric: String,
    direction: ObjectiveDirection,
}

impl WorkDistributor {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            max_attempts: 1,
            objective_metric: "likelihood_W_to_F".to_string(),
            direction: ObjectiveDirection::Maximize,
        }
    }

    pub fn with_max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_objective(mut self, metric: &str, direction: ObjectiveDirection) -> Self {
        self.objective_metric = metric.to_string();
        self.direction = direction;
        self
    }

    /// Run every grid point on the pool and wait for all workers to exit.
    pub fn run<E: TrialExecutor>(
        &self,
        params: &[CalibrationParams],
        executor: &E,
    ) -> WcResult<DistributionReport> {
        let started = Instant::now();
        let mut ledger = TrialLedger::new(uuid::Uuid::new_v4(), params, self.max_attempts);
        let mut status = ScanStatus::new(self.objective_metric.clone(), self.direction);
        status.id = ledger.scan_id;
        status.mark_running();

        let (work_tx, work_rx) = unbounded::<WorkItem>();
        let (event_tx, event_rx) = unbounded::<WorkerEvent>();

        let mut trial_entries = 0;
        for (index, p) in params.iter().enumerate() {
            send(&work_tx, WorkItem::Trial { index, params: *p })?;
            trial_entries += 1;
        }
        info!(
            "Queued {} trials for {} workers",
            trial_entries, self.num_workers
        );

        let (stop_entries, workers_exited) = std::thread::scope(|s| -> WcResult<(usize, usize)> {
            for worker_id in 0..self.num_workers {
                let rx = work_rx.clone();
                let tx = event_tx.clone();
                s.spawn(move || worker_loop(worker_id, rx, tx, executor));
            }
            // only workers hold event senders from here on
            drop(event_tx);

            let mut exited = 0;
            while !ledger.is_settled() {
                let Ok(event) = event_rx.recv() else {
                    warn!("All workers exited before the scan settled");
                    break;
                };
                match event {
                    WorkerEvent::Started { worker_id, index } => ledger.start(index, worker_id),
                    WorkerEvent::Finished {
                        worker_id,
                        index,
                        outcome: Ok(output),
                    } => {
                        if let Some(result) = ledger.complete(index, output) {
                            debug!("Worker {} completed trial {}", worker_id, index);
                            status.trials_completed += 1;
                            status.update_best(result);
                        }
                    }
                    WorkerEvent::Finished {
                        worker_id,
                        index,
                        outcome: Err(error),
                    } => {
                        warn!("Worker {} failed trial {}: {}", worker_id, index, error);
                        if ledger.fail(index, error) == RetryDecision::Retry {
                            send(
                                &work_tx,
                                WorkItem::Trial {
                                    index,
                                    params: params[index],
                                },
                            )?;
                            trial_entries += 1;
                        } else {
                            status.trials_failed += 1;
                        }
                    }
                    WorkerEvent::Exited { worker_id, .. } => {
                        warn!("Worker {} exited early", worker_id);
                        exited += 1;
                    }
                }
            }

            let mut stops = 0;
            for _ in 0..self.num_workers {
                send(&work_tx, WorkItem::Stop)?;
                stops += 1;
            }
            drop(work_tx);

            // drain until every worker has dropped its sender
            for event in event_rx.iter() {
                if let WorkerEvent::Exited { worker_id, trials } = event {
                    debug!("Worker {} exited after {} trials", worker_id, trials);
                    exited += 1;
                }
            }
            Ok((stops, exited))
        })?;

        let missing = ledger.missing();
        if missing.is_empty() {
            status.mark_completed();
        } else {
            for trial in &missing {
                warn!(
                    "No result for {} after {} attempts: {}",
                    trial.descriptor(),
                    trial.attempts,
                    trial.error.as_deref().unwrap_or("never ran")
                );
            }
            status.mark_failed(format!("{} of {} trials missing", missing.len(), ledger.len()));
        }

        Ok(DistributionReport {
            ledger,
            status,
            queue_entries: trial_entries + stop_entries,
            trial_entries,
            stop_entries,
            workers_exited,
            elapsed: started.elapsed(),
        })
    }
}

fn send(tx: &Sender<WorkItem>, item: WorkItem) -> WcResult<()> {
    tx.send(item)
        .map_err(|_| internal_error!("work queue has no receivers"))
}

fn worker_loop<E: TrialExecutor>(
    worker_id: usize,
    rx: Receiver<WorkItem>,
    tx: Sender<WorkerEvent>,
    executor: &E,
) {
    let mut trials = 0;
    // Stop or a closed queue both end the loop
    while let Ok(WorkItem::Trial { index, params }) = rx.recv() {
        if tx.send(WorkerEvent::Started { worker_id, index }).is_err() {
            break;
        }
        let outcome = run_trial(worker_id, &params, executor);
        trials += 1;
        if tx
            .send(WorkerEvent::Finished {
                worker_id,
                index,
                outcome,
            })
            .is_err()
        {
            break;
        }
    }
    info!("Worker {} finished all jobs ({} trials)", worker_id, trials);
    let _ = tx.send(WorkerEvent::Exited { worker_id, trials });
}

fn run_trial<E: TrialExecutor>(
    worker_id: usize,
    params: &CalibrationParams,
    executor: &E,
) -> Result<TrialOutput, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(params, worker_id))) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(TrialError::WorkerPanicked {
            worker_id,
            trial: TrialDescriptor::Calibration(*params).label(),
        }
        .to_string()),
    }
}
