use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use wc_data::DataPaths;
use wc_engine::{init_tracing, HandOff, PoissonFitter, SimulationContext, SimulationRunner};
use wc_types::{
    resolve_competitions, CalibrationParams, RatingsSource, ResumePoint, SimulationConfig,
    TournamentYear, TrainingWindow,
};

/// Simulate multiple World Cups
#[derive(Debug, Parser)]
#[command(name = "run_simulations")]
struct Args {
    /// How many simulations to run in total
    #[arg(long = "num_simulations", default_value_t = 100)]
    num_simulations: usize,

    /// How many samples to run per tournament batch
    #[arg(long = "per_tournament", default_value_t = 100)]
    per_tournament: usize,

    /// Worker threads
    #[arg(long = "num_thread", default_value_t = 1)]
    num_thread: usize,

    /// Which World Cup to simulate: 2014, 2018 or 2022
    #[arg(long = "tournament_year", default_value = "2022")]
    tournament_year: TournamentYear,

    /// Earliest date for training data
    #[arg(long = "training_data_start")]
    training_data_start: Option<NaiveDate>,

    /// Latest date for training data
    #[arg(long = "training_data_end")]
    training_data_end: Option<NaiveDate>,

    /// Years of training data before the tournament
    #[arg(long = "years_training_data", default_value_t = 6)]
    years_training_data: u32,

    /// Use actual results up to a date (YYYY-MM-DD) or the start of a round
    /// (Group, R16, QF, SF, Final)
    #[arg(long = "resume_from")]
    resume_from: Option<String>,

    #[arg(long = "output_csv", default_value = "sim_results.csv")]
    output_csv: String,

    #[arg(long = "output_loss_txt", default_value = "sim_results_loss.txt")]
    output_loss_txt: String,

    /// Fit the model without a ratings prior
    #[arg(long = "dont_use_ratings")]
    dont_use_ratings: bool,

    #[arg(long = "ratings_source", default_value = "org")]
    ratings_source: RatingsSource,

    #[arg(long = "include_competitions", default_value = "W,C1,WQ,CQ,C2,F")]
    include_competitions: String,

    #[arg(long = "exclude_competitions")]
    exclude_competitions: Option<String>,

    /// Exponential time-decay rate of training matches, per year
    #[arg(long = "epsilon", default_value_t = 0.0)]
    epsilon: f64,

    /// Extra weight of World Cup matches in the training data
    #[arg(long = "world_cup_weight", default_value_t = 1.0)]
    world_cup_weight: f64,

    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Directory holding results.csv and the fixture files
    #[arg(long = "data_dir", default_value = "data")]
    data_dir: PathBuf,

    #[arg(long = "output_dir", default_value = ".")]
    output_dir: PathBuf,

    /// Write one loss per sample instead of the aggregate summary
    #[arg(long = "loss_per_sample")]
    loss_per_sample: bool,

    /// Reduce batch tables in memory instead of through partial files
    #[arg(long = "in_memory")]
    in_memory: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(SimulationConfig, PathBuf, HandOff)> {
        let window = TrainingWindow::resolve(
            self.training_data_start,
            self.training_data_end,
            Some(self.years_training_data),
            self.tournament_year,
        )?;
        let mut config = SimulationConfig::new(self.tournament_year, window)
            .with_samples(self.num_simulations, self.per_tournament)
            .with_threads(self.num_thread)
            .with_resume(ResumePoint::parse(self.resume_from.as_deref())?)
            .with_seed(self.seed)
            .with_output_dir(self.output_dir);
        config.competitions = resolve_competitions(
            &self.include_competitions,
            self.exclude_competitions.as_deref(),
        )?;
        config.ratings_source = (!self.dont_use_ratings).then_some(self.ratings_source);
        config.params = CalibrationParams::new(self.epsilon, self.world_cup_weight);
        config.output_csv = self.output_csv;
        config.output_loss_txt = self.output_loss_txt;
        config.loss_per_sample = self.loss_per_sample;
        config.validate()?;

        let hand_off = if self.in_memory {
            HandOff::InMemory
        } else {
            HandOff::Files
        };
        Ok((config, self.data_dir, hand_off))
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let (mut config, data_dir, hand_off) = Args::parse().into_config()?;
    let paths = DataPaths::new(&data_dir);
    let today = chrono::Local::now().date_naive();

    let ctx = SimulationContext::load(&paths, &mut config, &PoissonFitter::default(), today)
        .with_context(|| format!("failed to prepare simulation from {}", data_dir.display()))?;
    let report = SimulationRunner::new(config)
        .with_hand_off(hand_off)
        .run(&ctx)
        .context("simulation run failed")?;

    tracing::info!(
        "Wrote {} ({} samples)",
        report.merged_path.display(),
        report.samples
    );
    if let Some(path) = &report.loss_path {
        tracing::info!("Wrote {}", path.display());
    }
    Ok(())
}
