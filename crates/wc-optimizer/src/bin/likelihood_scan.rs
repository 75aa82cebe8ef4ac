use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use wc_data::DataPaths;
use wc_engine::{init_tracing, PoissonFitter};
use wc_optimizer::LikelihoodScan;
use wc_types::{resolve_competitions, RatingsSource, ScanConfig, TrainingWindow};

/// Scan epsilon and World Cup weight by held-out likelihood
#[derive(Debug, Parser)]
#[command(name = "likelihood_scan")]
struct Args {
    #[arg(long = "train_start", default_value = "1982-01-01")]
    train_start: NaiveDate,

    #[arg(long = "train_end", default_value = "2020-12-31")]
    train_end: NaiveDate,

    #[arg(long = "test_start", default_value = "2021-01-01")]
    test_start: NaiveDate,

    #[arg(long = "test_end", default_value = "2022-12-31")]
    test_end: NaiveDate,

    /// Comma-separated time-decay rates
    #[arg(long = "epsilon", value_delimiter = ',', default_value = "0.0,0.1,0.2,0.3,0.4")]
    epsilon: Vec<f64>,

    /// Comma-separated World Cup weights
    #[arg(
        long = "world_cup_weight",
        value_delimiter = ',',
        default_value = "1.0,1.5,2.0,2.5,3.0"
    )]
    world_cup_weight: Vec<f64>,

    #[arg(long = "num_thread", default_value_t = 8)]
    num_thread: usize,

    /// Score test matches unweighted instead of with each trial's weights
    #[arg(long = "test_without_weights")]
    test_without_weights: bool,

    #[arg(long = "include_competitions", default_value = "W,C1,WQ,CQ,C2,F")]
    include_competitions: String,

    #[arg(long = "exclude_competitions")]
    exclude_competitions: Option<String>,

    #[arg(long = "dont_use_ratings")]
    dont_use_ratings: bool,

    #[arg(long = "ratings_source", default_value = "org")]
    ratings_source: RatingsSource,

    /// Attempts per grid point before it is reported missing
    #[arg(long = "max_attempts", default_value_t = 1)]
    max_attempts: usize,

    #[arg(long = "data_dir", default_value = "data")]
    data_dir: PathBuf,

    /// Defaults to likelihood_scan_<timestamp>
    #[arg(long = "output_dir")]
    output_dir: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(ScanConfig, PathBuf)> {
        let train = TrainingWindow::new(self.train_start, self.train_end)?;
        let test = TrainingWindow::new(self.test_start, self.test_end)?;
        let output_dir = self
            .output_dir
            .unwrap_or_else(|| PathBuf::from(format!("likelihood_scan_{}", Utc::now().timestamp())));

        let mut config = ScanConfig::new(train, test)
            .with_grid(self.epsilon, self.world_cup_weight)
            .with_threads(self.num_thread)
            .with_output_dir(output_dir)
            .with_test_weights(!self.test_without_weights);
        config.competitions = resolve_competitions(
            &self.include_competitions,
            self.exclude_competitions.as_deref(),
        )?;
        config.ratings_source = (!self.dont_use_ratings).then_some(self.ratings_source);
        config.max_attempts = self.max_attempts;
        config.validate()?;
        Ok((config, self.data_dir))
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let (config, data_dir) = Args::parse().into_config()?;
    let paths = DataPaths::new(&data_dir);

    let report = LikelihoodScan::new(config)
        .run(&paths, PoissonFitter::default())
        .with_context(|| format!("likelihood scan over {} failed", data_dir.display()))?;

    tracing::info!(
        "Wrote {} results to {}",
        report.rows.len(),
        report.output_dir.display()
    );
    if !report.missing.is_empty() {
        anyhow::bail!("{} grid points produced no results", report.missing.len());
    }
    Ok(())
}
