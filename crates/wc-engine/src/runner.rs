use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wc_data::{
    merged_file_name, partial_file_name, ArtifactStore, DataLoader, DataPaths, ResultFilter,
    ResultMerger,
};
use wc_types::{
    FitSettings, MatchPredictor, MatchWeighting, ModelFitter, SimulationBatch, SimulationConfig,
    validation_error, Stage, StageCountTable, TournamentLayout, TournamentYear, TrainingWindow,
    TrialDescriptor, WcError, WcResult, WORLD_CUP,
};

use crate::aggregate::ResultAggregator;
use crate::loss::{LossEvaluator, LossSummary};
use crate::reconcile::{resolve_resume, ResumeReconciler};
use crate::tournament::TournamentSimulator;

/// How finished batches hand their tables to the merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandOff {
    /// Each batch writes a partial file; the merger collects them afterwards.
    #[default]
    Files,
    /// Tables are reduced in memory once the pool has joined.
    InMemory,
}

/// Partition of a run into equally sized batches.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub batches: Vec<SimulationBatch>,
}

impl BatchPlan {
    /// `ceil(total / per_batch)` batches of `per_batch` samples each.
    pub fn new(
        total: usize,
        per_batch: usize,
        year: TournamentYear,
        resume_from: Option<NaiveDate>,
        seed: Option<u64>,
    ) -> WcResult<Self> {
        if per_batch == 0 {
            return Err(WcError::Config("per_tournament must be at least 1".to_string()));
        }
        let count = total.div_ceil(per_batch);
        let batches = (0..count)
            .map(|batch_index| SimulationBatch {
                batch_index,
                tournament_year: year,
                sample_count: per_batch,
                resume_from,
                seed,
            })
            .collect();
        Ok(Self { batches })
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn total_samples(&self) -> usize {
        self.batches.iter().map(|b| b.sample_count).sum()
    }
}

/// Everything a batch needs to play samples. Shared read-only by all workers.
pub struct SimulationContext {
    pub year: TournamentYear,
    pub layout: TournamentLayout,
    pub model: Box<dyn MatchPredictor>,
    pub reconciler: ResumeReconciler,
    /// Present only for completed tournaments with known final stages.
    pub evaluator: Option<LossEvaluator>,
    pub resume_from: Option<NaiveDate>,
}

impl SimulationContext {
    /// Load fixtures and results, resolve the resume point, clamp the
    /// training window and fit the model.
    pub fn load<F>(
        paths: &DataPaths,
        config: &mut SimulationConfig,
        fitter: &F,
        today: NaiveDate,
    ) -> WcResult<Self>
    where
        F: ModelFitter,
        F::Model: 'static,
    {
        config.validate()?;
        let year = config.tournament_year;
        let loader = DataLoader::new();

        let layout = loader.load_fixtures(
            paths.fixtures(year),
            &format!("World Cup {year}"),
            Some(year.host().to_string()),
        )?;
        let resume_from = resolve_resume(config.resume_from, &layout, year, today)?;

        if config.training_window.clamp_to_resume(resume_from) {
            info!(
                "Training data end moved forward to {}, the day before the resume date",
                config.training_window.end
            );
        }
        info!(
            "Simulating {}: {} samples in batches of {} on {} threads",
            year, config.num_simulations, config.per_tournament, config.num_thread
        );
        info!(
            "Training data {} to {}, competitions {}, ratings {:?}, {}",
            config.training_window.start,
            config.training_window.end,
            config.competitions.join(","),
            config.ratings_source,
            config.params
        );
        match resume_from {
            Some(date) => info!("Using actual results from before {}", date),
            None => info!("Simulating the full tournament"),
        }

        let training = loader.load_results(
            paths.results(),
            &ResultFilter::new(config.training_window, &config.competitions),
        )?;
        let settings = FitSettings {
            weighting: MatchWeighting::new(config.params, config.training_window.end),
            host: Some(year.host().to_string()),
            ratings_source: config.ratings_source,
        };
        let model = fitter.fit(&training, &settings)?;

        let reconciler = match (resume_from, layout.first_fixture_date(), layout.last_fixture_date()) {
            (Some(cutoff), Some(first), Some(last)) => {
                let span = TrainingWindow::new(first, last)?;
                let actuals = loader.load_results(
                    paths.results(),
                    &ResultFilter::new(span, &[WORLD_CUP.to_string()]),
                )?;
                ResumeReconciler::new(&layout, Some(cutoff), &actuals)
            }
            _ => ResumeReconciler::fully_simulated(&layout),
        };

        let evaluator = if year.is_live() {
            None
        } else {
            let path = paths.actual_stages(year);
            if path.exists() {
                Some(LossEvaluator::new(loader.load_actual_stages(&path)?))
            } else {
                warn!("No actual stages at {}; loss will not be computed", path.display());
                None
            }
        };

        Ok(Self {
            year,
            layout,
            model: Box::new(model),
            reconciler,
            evaluator,
            resume_from,
        })
    }
}

/// Output of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    pub batch_index: usize,
    pub table: StageCountTable,
    pub losses: Vec<u32>,
}

/// Final artifacts of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_tag: String,
    pub table: StageCountTable,
    pub samples: u64,
    pub merged_path: PathBuf,
    pub loss: Option<LossSummary>,
    pub loss_path: Option<PathBuf>,
    pub sample_losses: Vec<u32>,
    pub failed_batches: usize,
    pub elapsed: Duration,
}

/// Fans batches out over a bounded pool and merges what comes back.
#[derive(Debug, Clone)]
pub struct SimulationRunner {
    config: SimulationConfig,
    hand_off: HandOff,
    run_tag: String,
}

impl SimulationRunner {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            hand_off: HandOff::default(),
            run_tag: new_run_tag(),
        }
    }

    pub fn with_hand_off(mut self, hand_off: HandOff) -> Self {
        self.hand_off = hand_off;
        self
    }

    pub fn with_run_tag(mut self, run_tag: impl Into<String>) -> Self {
        self.run_tag = run_tag.into();
        self
    }

    pub fn plan(&self, ctx: &SimulationContext) -> WcResult<BatchPlan> {
        BatchPlan::new(
            self.config.num_simulations,
            self.config.per_tournament,
            ctx.year,
            ctx.resume_from,
            self.config.seed,
        )
    }

    pub fn run(&self, ctx: &SimulationContext) -> WcResult<RunReport> {
        let plan = self.plan(ctx)?;
        self.run_plan(ctx, &plan)
    }

    /// Run the given batches and merge whatever they produce. A failed batch
    /// is logged and dropped; the merge proceeds without it.
    pub fn run_plan(&self, ctx: &SimulationContext, plan: &BatchPlan) -> WcResult<RunReport> {
        self.config.validate()?;
        let started = Instant::now();
        let store = ArtifactStore::new(&self.config.output_dir)?;
        let sample_losses_wanted = self.config.loss_per_sample && ctx.evaluator.is_some();
        if self.config.loss_per_sample && ctx.evaluator.is_none() {
            warn!("Per-sample loss requested but no actual result is available");
        }

        info!(
            "Running {} batches ({} samples) with {:?} hand-off, run {}",
            plan.len(),
            plan.total_samples(),
            self.hand_off,
            self.run_tag
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_thread)
            .build()
            .map_err(|e| WcError::Internal(format!("failed to build thread pool: {e}")))?;
        let file_store = match self.hand_off {
            HandOff::Files => Some(&store),
            HandOff::InMemory => None,
        };
        let results: Vec<WcResult<BatchOutput>> = pool.install(|| {
            plan.batches
                .par_iter()
                .map(|batch| self.run_batch(ctx, batch, file_store))
                .collect()
        });

        let mut outputs = Vec::with_capacity(results.len());
        let mut failed_batches = 0;
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    failed_batches += 1;
                    warn!("Batch failed and was dropped: {}", e);
                }
            }
        }

        let (table, merged_path, sample_losses, mut loss_path) = match self.hand_off {
            HandOff::Files => {
                let merger = ResultMerger::new(store.clone(), self.run_tag.as_str());
                let merged = merger.merge_tables(&self.config.output_csv)?;
                let (losses, loss_path) = if sample_losses_wanted {
                    let losses = merger.merge_losses(&self.config.output_loss_txt)?;
                    (losses.losses, Some(losses.merged_path))
                } else {
                    (Vec::new(), None)
                };
                (merged.table, merged.merged_path, losses, loss_path)
            }
            HandOff::InMemory => {
                outputs.sort_by_key(|o| o.batch_index);
                let table = StageCountTable::merge_all(outputs.iter().map(|o| &o.table));
                let merged_path = store.write_stage_table(
                    &merged_file_name(&self.run_tag, &self.config.output_csv),
                    &table,
                )?;
                let losses: Vec<u32> = outputs.iter().flat_map(|o| o.losses.iter().copied()).collect();
                let loss_path = if sample_losses_wanted {
                    Some(store.write_losses(
                        &merged_file_name(&self.run_tag, &self.config.output_loss_txt),
                        &losses,
                    )?)
                } else {
                    None
                };
                (table, merged_path, losses, loss_path)
            }
        };

        let samples = table.sample_count()?;
        let mut loss = None;
        if let Some(evaluator) = ctx.evaluator.as_ref().filter(|_| !self.config.loss_per_sample) {
            if samples > 0 {
                let summary = evaluator.table_loss(&table)?;
                info!(
                    "Loss: modal {} expected {:.3} over {} samples",
                    summary.modal_stage_loss, summary.expected_stage_loss, summary.samples
                );
                loss_path = Some(store.write_text(
                    &merged_file_name(&self.run_tag, &self.config.output_loss_txt),
                    &summary.to_string(),
                )?);
                loss = Some(summary);
            }
        }

        for (team, counts) in table.ranked_by_wins().into_iter().take(5) {
            info!(
                "{:<20} W {:>8} RU {:>8}",
                team,
                counts.get(Stage::Winner),
                counts.get(Stage::RunnerUp)
            );
        }

        let elapsed = started.elapsed();
        if samples > 0 {
            let per_tournament = elapsed.as_secs_f64() / samples as f64;
            info!(
                "{} samples in {:.1}s: {:.4}s per tournament, {:.0}s projected for 100,000",
                samples,
                elapsed.as_secs_f64(),
                per_tournament,
                per_tournament * 100_000.0
            );
        }
        if failed_batches > 0 {
            warn!("{} of {} batches failed", failed_batches, plan.len());
        }

        Ok(RunReport {
            run_tag: self.run_tag.clone(),
            table,
            samples,
            merged_path,
            loss,
            loss_path,
            sample_losses,
            failed_batches,
            elapsed,
        })
    }

    /// Play one batch. With a store, the batch's table (and per-sample
    /// losses) are also written as partial files of this run.
    pub fn run_batch(
        &self,
        ctx: &SimulationContext,
        batch: &SimulationBatch,
        store: Option<&ArtifactStore>,
    ) -> WcResult<BatchOutput> {
        if batch.tournament_year != ctx.year {
            return Err(validation_error!(
                "batch {} is for {}, context is {}",
                batch.batch_index,
                batch.tournament_year,
                ctx.year
            ));
        }
        let mut rng = match batch.batch_seed() {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let simulator = TournamentSimulator::new(&ctx.layout, ctx.model.as_ref(), &ctx.reconciler);
        let per_sample = ctx
            .evaluator
            .as_ref()
            .filter(|_| self.config.loss_per_sample);

        let mut aggregator = ResultAggregator::new(ctx.layout.teams());
        let mut losses = Vec::new();
        for _ in 0..batch.sample_count {
            let outcome = simulator.simulate(&mut rng)?;
            aggregator.record_sample(&outcome)?;
            if let Some(evaluator) = per_sample {
                losses.push(evaluator.stage_loss(&outcome)?);
            }
        }

        if let Some(store) = store {
            let batch_id = Uuid::new_v4();
            store.write_stage_table(
                &partial_file_name(batch_id, &self.run_tag, &self.config.output_csv),
                aggregator.table(),
            )?;
            if per_sample.is_some() {
                store.write_losses(
                    &partial_file_name(batch_id, &self.run_tag, &self.config.output_loss_txt),
                    &losses,
                )?;
            }
        }
        debug!("Finished {}", TrialDescriptor::Simulation(batch.clone()));

        Ok(BatchOutput {
            batch_index: batch.batch_index,
            table: aggregator.into_table(),
            losses,
        })
    }
}

/// Unix seconds plus a short random suffix, so runs started in the same
/// second never share partial files.
fn new_run_tag() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", chrono::Utc::now().timestamp(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_rounds_up() {
        let plan = BatchPlan::new(1000, 300, TournamentYear::Y2018, None, Some(5)).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.total_samples(), 1200);
        assert!(plan.batches.iter().all(|b| b.sample_count == 300));
        assert_eq!(plan.batches[3].batch_seed(), Some(8));

        let exact = BatchPlan::new(1000, 100, TournamentYear::Y2018, None, None).unwrap();
        assert_eq!(exact.len(), 10);
        assert!(BatchPlan::new(0, 100, TournamentYear::Y2018, None, None).unwrap().is_empty());
        assert!(BatchPlan::new(10, 0, TournamentYear::Y2018, None, None).is_err());
    }

    #[test]
    fn run_tags_differ_within_a_second() {
        let a = new_run_tag();
        let b = new_run_tag();
        assert_ne!(a, b);
        let (secs, suffix) = a.split_once('-').unwrap();
        assert!(secs.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 8);
    }
}
